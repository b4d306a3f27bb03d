use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use scribeconf::ScribeConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::creative::{CreativeRequest, InferenceClient};
use crate::media::{Ffmpeg, MediaTool};
use crate::probes::{rescue_instruments, run_probes, ClassifierHandle, ProbeContext};
use crate::taxonomy::Taxonomy;
use crate::tempo::{estimate_tempo, tempo_category};
use crate::types::{CreativeOutcome, CreativeStatus, TrackRecord};

/// Everything one analysis run needs, owned by the caller and shared by
/// reference across tracks.
pub struct AnalysisContext {
    config: ScribeConfig,
    taxonomy: Arc<Taxonomy>,
    media: Arc<dyn MediaTool>,
    classifier: ClassifierHandle,
    inference: Option<InferenceClient>,
    shutdown: CancellationToken,
}

impl AnalysisContext {
    /// Build the production context: ffmpeg tools, CLAP classifier and the
    /// configured inference service.
    pub fn from_config(config: ScribeConfig) -> Result<Self> {
        let taxonomy =
            Taxonomy::load(&config.analysis.taxonomy).context("loading taxonomy")?;
        let inference = InferenceClient::from_config(&config.services.inference)
            .context("building inference client")?;

        let media = Arc::new(Ffmpeg::from_config(&config.services.tools));
        let classifier = ClassifierHandle::from_config(&config.services.classifier);

        Ok(Self::with_parts(
            config,
            Arc::new(taxonomy),
            media,
            classifier,
            Some(inference),
        ))
    }

    /// Assemble a context from explicit parts (tests, alternative backends).
    /// `inference: None` disables the description step.
    pub fn with_parts(
        config: ScribeConfig,
        taxonomy: Arc<Taxonomy>,
        media: Arc<dyn MediaTool>,
        classifier: ClassifierHandle,
        inference: Option<InferenceClient>,
    ) -> Self {
        Self {
            config,
            taxonomy,
            media,
            classifier,
            inference,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn without_creative(mut self) -> Self {
        self.inference = None;
        self
    }

    pub fn without_probes(mut self) -> Self {
        self.classifier = ClassifierHandle::disabled();
        self
    }

    /// Cancelling this token stops in-flight decodes and probe requests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Analyze one track.
    ///
    /// Only a failed metadata probe is an error; every later stage degrades
    /// to its documented default.
    #[tracing::instrument(name = "track.analyze", skip_all, fields(path = %path.display()))]
    pub async fn analyze(&self, path: &Path) -> Result<TrackRecord> {
        let metadata = self
            .media
            .probe_metadata(path)
            .await
            .with_context(|| format!("probing {}", path.display()))?;
        info!(
            duration = metadata.duration_sec,
            codec = %metadata.codec,
            "metadata probed"
        );

        let title = track_title(path);
        let cancel = self.shutdown.child_token();
        let probe_ctx = ProbeContext {
            media: self.media.as_ref(),
            classifier: &self.classifier,
            config: &self.config.analysis.probes,
        };

        let (tempo, probes, loudness, has_wav) = tokio::join!(
            estimate_tempo(self.media.as_ref(), path, metadata.duration_sec, &cancel),
            run_probes(probe_ctx, path, &title, metadata.duration_sec, &cancel),
            self.media.measure_loudness(path),
            has_wav_version(path),
        );

        let loudness = loudness.unwrap_or_else(|e| {
            warn!(error = %e, "loudness measurement failed");
            Default::default()
        });
        let bpm = tempo.as_ref().map(|t| t.bpm);

        let cap = self.config.analysis.taxonomy.instrument_cap;
        let mut creative = match &self.inference {
            Some(client) => {
                let request = CreativeRequest {
                    title: title.clone(),
                    bpm,
                    lufs: loudness.lufs_integrated,
                };
                client.describe(&self.taxonomy, &request, cap).await
            }
            None => CreativeOutcome::degraded(CreativeStatus::Disabled),
        };

        creative.result.instrument = rescue_instruments(
            &self.taxonomy,
            &creative.result.instrument,
            &probes.hints,
            cap,
        );
        if probes.hints.get("vocals").copied().unwrap_or(false) && !creative.result.has_vocals() {
            debug!("probes heard vocals but the description says none; keeping description");
        }

        Ok(TrackRecord {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.display().to_string(),
            analyzed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            has_wav_version: has_wav,
            duration_sec: metadata.duration_sec,
            bit_rate: metadata.bit_rate,
            sample_rate: metadata.sample_rate,
            channels: metadata.channels,
            codec: metadata.codec,
            lufs_integrated: loudness.lufs_integrated,
            loudness_range: loudness.loudness_range,
            true_peak_db: loudness.true_peak_db,
            estimated_tempo_bpm: bpm,
            tempo_category: bpm.map(|b| tempo_category(b).to_string()),
            probe_labels: probes.labels(),
            hints: probes.hints,
            probe_status: probes.status,
            creative_status: creative.status.status_line(),
            creative_state: creative.status,
            creative: creative.result,
        })
    }
}

/// Title the description is built from: the file name without extension.
pub fn track_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether a `.wav` sibling with the same stem exists next to `path`.
pub async fn has_wav_version(path: &Path) -> bool {
    let wav = path.with_extension("wav");
    if wav == path {
        return false;
    }
    tokio::fs::try_exists(&wav).await.unwrap_or(false)
}
