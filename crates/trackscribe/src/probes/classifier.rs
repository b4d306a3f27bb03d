//! Zero-shot audio/text classification service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ClassifierError;
use crate::taxonomy::parse_confidence;

const HYPOTHESIS_TEMPLATE: &str = "This is a sound of {}.";
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// A model scoring candidate labels. `Ok(None)` means the model could not
/// produce an answer right now, which is not an error.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify_audio(
        &self,
        samples: &[f32],
        sample_rate: u32,
        labels: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError>;

    async fn classify_text(
        &self,
        text: &str,
        labels: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError>;
}

/// HTTP client for a local CLAP-style classification service.
#[derive(Debug, Clone)]
pub struct ClapService {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    #[serde(default)]
    scores: Vec<RawScore>,
}

#[derive(Debug, Deserialize)]
struct RawScore {
    label: String,
    #[serde(default)]
    score: Value,
}

impl ClapService {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Probe `/health`; `None` when the service is absent or not ready.
    pub async fn connect(url: &str) -> Option<Self> {
        let service = Self::new(url);
        let health = format!("{}/health", service.url);

        match service
            .client
            .get(&health)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                info!(url = %service.url, "classifier ready");
                Some(service)
            }
            Ok(resp) => {
                warn!(url = %service.url, status = %resp.status(), "classifier not ready");
                None
            }
            Err(e) => {
                warn!(url = %service.url, error = %e, "classifier unreachable");
                None
            }
        }
    }

    async fn classify(
        &self,
        body: Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        tokio::select! {
            result = self.post_classify(&body) => result,
            _ = cancel.cancelled() => Err(ClassifierError::Cancelled),
        }
    }

    async fn post_classify(
        &self,
        body: &Value,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        let resp = self
            .client
            .post(format!("{}/classify", self.url))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ClassifyResponse = resp
            .json()
            .await
            .map_err(|e| ClassifierError::Malformed(e.to_string()))?;
        Ok(Some(
            parsed
                .scores
                .into_iter()
                .map(|s| LabelScore {
                    score: parse_confidence(&s.score, 0.0),
                    label: s.label,
                })
                .collect(),
        ))
    }
}

#[async_trait]
impl Classifier for ClapService {
    async fn classify_audio(
        &self,
        samples: &[f32],
        sample_rate: u32,
        labels: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let body = json!({
            "audio": base64::engine::general_purpose::STANDARD.encode(bytes),
            "sample_rate": sample_rate,
            "labels": labels,
            "hypothesis_template": HYPOTHESIS_TEMPLATE,
        });
        self.classify(body, cancel).await
    }

    async fn classify_text(
        &self,
        text: &str,
        labels: &[&str],
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<LabelScore>>, ClassifierError> {
        let body = json!({
            "text": text,
            "labels": labels,
        });
        self.classify(body, cancel).await
    }
}

/// Shared, lazily-resolved classifier.
///
/// Cloning shares the same cell. The first caller of [`get`](Self::get)
/// performs the readiness check; concurrent first callers wait on it and
/// every later caller sees the same answer.
#[derive(Clone)]
pub struct ClassifierHandle {
    cell: Arc<OnceCell<Option<Arc<dyn Classifier>>>>,
    url: Option<String>,
}

impl ClassifierHandle {
    /// Resolve a [`ClapService`] at `url` on first use.
    pub fn clap(url: impl Into<String>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new()),
            url: Some(url.into()),
        }
    }

    pub fn from_config(config: &scribeconf::ClassifierConfig) -> Self {
        if config.enabled {
            Self::clap(config.url.clone())
        } else {
            Self::disabled()
        }
    }

    /// A handle that never yields a classifier.
    pub fn disabled() -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(None))),
            url: None,
        }
    }

    /// A handle around an already-constructed classifier.
    pub fn ready(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(Some(classifier)))),
            url: None,
        }
    }

    pub async fn get(&self) -> Option<Arc<dyn Classifier>> {
        self.cell
            .get_or_init(|| async {
                let url = self.url.as_deref()?;
                let service = ClapService::connect(url).await?;
                Some(Arc::new(service) as Arc<dyn Classifier>)
            })
            .await
            .clone()
    }
}

impl std::fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.cell.get() {
            None => "pending",
            Some(None) => "unavailable",
            Some(Some(_)) => "ready",
        };
        f.debug_struct("ClassifierHandle")
            .field("url", &self.url)
            .field("state", &state)
            .finish()
    }
}
