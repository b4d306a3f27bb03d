//! Track descriptions from a local Ollama-compatible chat service.
//!
//! The model sees only the title and a few technical numbers, answers in JSON,
//! and everything it says is forced through the taxonomy before it is kept.
//! Every failure ends in a [`CreativeOutcome`] with a degraded status; nothing
//! here aborts an analysis.

use std::time::Duration;

use scribeconf::InferenceConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::InferenceError;
use crate::taxonomy::{Taxonomy, Vocabulary, CREATIVE_DEFAULT_CONFIDENCE};
use crate::types::{CreativeOutcome, CreativeStatus};

/// Model families that behave better with a cooler sampling temperature.
const PRECISE_FAMILIES: &[&str] = &["qwen2.5", "gemma2", "mixtral"];
const PRECISE_TEMPERATURE: f64 = 0.3;
const DEFAULT_TEMPERATURE: f64 = 0.7;
const TOP_P: f64 = 0.9;

/// What the model is told about a track.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeRequest {
    pub title: String,
    pub bpm: Option<u32>,
    pub lufs: Option<f64>,
}

pub fn temperature_for(model: &str) -> f64 {
    if PRECISE_FAMILIES.iter().any(|family| model.contains(family)) {
        PRECISE_TEMPERATURE
    } else {
        DEFAULT_TEMPERATURE
    }
}

pub fn system_prompt(taxonomy: &Taxonomy) -> String {
    let list = |which| taxonomy.vocabulary(which).join(", ");
    format!(
        r#"You are an expert music analyst. Analyze the track based on its metadata and categorize it using ONLY these specific values:

MOOD options: {mood}
GENRE options: {genre}
THEME options: {theme}
INSTRUMENT options: {instrument}
VOCALS options: {vocals}
LYRIC THEMES (if vocals present): {lyric_themes}

Return ONLY a JSON object with this exact structure:
{{
  "mood": ["1-3 moods from the list above"],
  "genre": ["1-2 genres from the list above"],
  "theme": ["1-2 themes from the list above"],
  "instrument": ["detected instruments from the list above - be comprehensive"],
  "vocals": ["MUST be one or more from: {vocals}"],
  "lyricThemes": ["1-2 lyric themes IF vocals are present, otherwise empty array"],
  "narrative": "A compelling 40-80 word description of the track's musical character, emotional impact, and sonic qualities",
  "confidence": 0.85
}}

CRITICAL:
- Use ONLY the exact values from the lists provided
- For instruments, be comprehensive and include all detected instruments
- Common variations like "drums", "bass", "piano" should map to their proper names from the list
- Include both primary and secondary instruments
- If you detect synthesizers, specify the type (Synth Pad, Synth Lead, etc.)
- For vocals: ALWAYS include at least one vocal type. If no vocals detected, use ["No Vocals"]
- If vocals are present, be specific: use "Lead Vocals" for main vocals, add "Male Vocals" or "Female Vocals" if identifiable
- Include lyricThemes ONLY if vocals are NOT "No Vocals", otherwise use empty array
- confidence must be a decimal number from 0.0 to 1.0 (do NOT use percentages like "85%")
- Never leave vocals array empty
Return ONLY valid JSON, no other text."#,
        mood = list(Vocabulary::Mood),
        genre = list(Vocabulary::Genre),
        theme = list(Vocabulary::Theme),
        instrument = list(Vocabulary::Instrument),
        vocals = list(Vocabulary::Vocals),
        lyric_themes = list(Vocabulary::LyricThemes),
    )
}

pub fn user_prompt(request: &CreativeRequest) -> String {
    let tempo = request
        .bpm
        .map(|b| b.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let loudness = request
        .lufs
        .map(|l| format!("{:.1}", l))
        .unwrap_or_else(|| "Unknown".to_string());

    format!(
        "Analyze this track:\n\
         Title: \"{}\"\n\
         Tempo: {} BPM\n\
         Loudness: {} LUFS\n\
         \n\
         Based on the title and technical characteristics, provide your creative analysis. \
         Be thorough in identifying instruments.",
        request.title, tempo, loudness
    )
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for the inference service.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    url: String,
    model: String,
    attempts: u32,
    backoff: Duration,
}

impl InferenceClient {
    pub fn from_config(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            attempts: config.attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> InferenceError {
        if e.is_connect() {
            InferenceError::Offline {
                url: self.url.clone(),
                message: e.to_string(),
            }
        } else {
            InferenceError::Request(e)
        }
    }

    /// Attach the current trace context so the service's spans join ours.
    fn inject_trace_context(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let context = tracing::Span::current().context();
        let span = context.span();
        let span_context = span.span_context();

        if span_context.is_valid() {
            let flags = if span_context.is_sampled() { "01" } else { "00" };
            let traceparent = format!(
                "00-{}-{}-{}",
                span_context.trace_id(),
                span_context.span_id(),
                flags
            );
            builder.header("traceparent", traceparent)
        } else {
            builder
        }
    }

    /// Check the service is up and the configured model is installed.
    pub async fn health(&self) -> Result<(), InferenceError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.url))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;
        let latest = format!("{}:latest", self.model);
        if tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name == latest)
        {
            Ok(())
        } else {
            Err(InferenceError::ModelMissing {
                model: self.model.clone(),
            })
        }
    }

    /// One non-streaming chat round trip; returns the message content.
    pub async fn chat(&self, system: &str, user: &str) -> Result<String, InferenceError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
            "format": "json",
            "options": {
                "temperature": temperature_for(&self.model),
                "top_p": TOP_P,
            },
        });

        let request = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body);
        let resp = self
            .inject_trace_context(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND && body.contains("not found") {
                return Err(InferenceError::ModelMissing {
                    model: self.model.clone(),
                });
            }
            return Err(InferenceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = resp
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;
        match parsed.pointer("/message/content").and_then(Value::as_str) {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(InferenceError::Malformed("response has no message content".into())),
        }
    }

    /// Ask for a description, retrying with a fixed backoff. The first reply
    /// that parses as a JSON object wins. A missing model is not retried.
    pub async fn generate(
        &self,
        taxonomy: &Taxonomy,
        request: &CreativeRequest,
    ) -> Result<Value, InferenceError> {
        let system = system_prompt(taxonomy);
        let user = user_prompt(request);
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.backoff).await;
            }

            let result = self.chat(&system, &user).await.and_then(|content| {
                match serde_json::from_str::<Value>(&content) {
                    Ok(value) if value.is_object() => Ok(value),
                    Ok(_) => Err(InferenceError::Malformed("reply is not a JSON object".into())),
                    Err(e) => Err(InferenceError::Malformed(e.to_string())),
                }
            });

            match result {
                Ok(value) => {
                    debug!(attempt, "model reply parsed");
                    return Ok(value);
                }
                Err(e @ InferenceError::ModelMissing { .. }) => return Err(e),
                Err(e) => {
                    warn!(attempt, attempts = self.attempts, error = %e, "creative attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| InferenceError::Malformed("no attempts made".into())))
    }

    /// Full description step: health check, generation and validation.
    #[tracing::instrument(
        name = "creative.describe",
        skip_all,
        fields(model = %self.model, title = %request.title, status = tracing::field::Empty)
    )]
    pub async fn describe(
        &self,
        taxonomy: &Taxonomy,
        request: &CreativeRequest,
        instrument_cap: usize,
    ) -> CreativeOutcome {
        let outcome = match self.try_describe(taxonomy, request, instrument_cap).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "creative analysis degraded");
                CreativeOutcome::degraded(self.status_for(&e))
            }
        };

        let line = outcome.status.status_line();
        tracing::Span::current().record("status", line.as_str());
        info!(status = %line, "creative analysis finished");
        outcome
    }

    async fn try_describe(
        &self,
        taxonomy: &Taxonomy,
        request: &CreativeRequest,
        instrument_cap: usize,
    ) -> Result<CreativeOutcome, InferenceError> {
        match self.health().await {
            Ok(()) => {}
            Err(e @ (InferenceError::Offline { .. } | InferenceError::ModelMissing { .. })) => {
                return Err(e)
            }
            // a flaky tags endpoint should not stop a chat that may still work
            Err(e) => debug!(error = %e, "health check inconclusive"),
        }

        let raw = self.generate(taxonomy, request).await?;
        let result = taxonomy.validate_creative(&raw, instrument_cap, CREATIVE_DEFAULT_CONFIDENCE);
        debug!(
            genre = ?result.genre,
            mood = ?result.mood,
            instruments = result.instrument.len(),
            "creative result validated"
        );

        Ok(CreativeOutcome {
            result,
            status: CreativeStatus::Complete,
        })
    }

    fn status_for(&self, error: &InferenceError) -> CreativeStatus {
        match error {
            InferenceError::Offline { .. } => CreativeStatus::Offline,
            InferenceError::ModelMissing { model } => CreativeStatus::ModelMissing {
                remediation: format!("ollama pull {}", model),
            },
            other => CreativeStatus::Error {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_by_family() {
        assert_eq!(temperature_for("qwen2.5:7b"), 0.3);
        assert_eq!(temperature_for("gemma2:9b"), 0.3);
        assert_eq!(temperature_for("mixtral:8x7b"), 0.3);
        assert_eq!(temperature_for("qwen3:8b"), 0.7);
        assert_eq!(temperature_for("llama3.1"), 0.7);
    }

    #[test]
    fn user_prompt_marks_unknowns() {
        let prompt = user_prompt(&CreativeRequest {
            title: "Night Drive".into(),
            bpm: None,
            lufs: None,
        });
        assert!(prompt.contains("Title: \"Night Drive\""));
        assert!(prompt.contains("Tempo: Unknown BPM"));
        assert!(prompt.contains("Loudness: Unknown LUFS"));

        let prompt = user_prompt(&CreativeRequest {
            title: "Night Drive".into(),
            bpm: Some(124),
            lufs: Some(-13.96),
        });
        assert!(prompt.contains("Tempo: 124 BPM"));
        assert!(prompt.contains("Loudness: -14.0 LUFS"));
    }

    #[test]
    fn system_prompt_lists_the_vocabulary() {
        let taxonomy = Taxonomy::builtin().unwrap();
        let prompt = system_prompt(&taxonomy);
        assert!(prompt.contains("MOOD options: Upbeat/Energetic, Happy/Cheerful"));
        assert!(prompt.contains("Drum Kit (acoustic)"));
        assert!(prompt.contains("\"lyricThemes\""));
        assert!(!prompt.contains("{mood}"));
    }

    #[test]
    fn status_mapping() {
        let client = InferenceClient::from_config(&InferenceConfig::default()).unwrap();
        assert_eq!(
            client.status_for(&InferenceError::Offline {
                url: "u".into(),
                message: "refused".into()
            }),
            CreativeStatus::Offline
        );
        assert_eq!(
            client.status_for(&InferenceError::ModelMissing {
                model: "qwen3:8b".into()
            }),
            CreativeStatus::ModelMissing {
                remediation: "ollama pull qwen3:8b".into()
            }
        );
        assert!(matches!(
            client.status_for(&InferenceError::Malformed("x".into())),
            CreativeStatus::Error { .. }
        ));
    }
}
