//! Tempo estimation from onset-envelope autocorrelation.
//!
//! Window selection, decode at 11025 Hz, energy-flux envelope, banded
//! autocorrelation, octave resolution and a final bias toward common tempos.
//! Every stage except the decode is a pure function.

pub mod autocorr;
pub mod envelope;
pub mod normalize;
pub mod octave;
pub mod window;

pub use autocorr::{autocorrelate, score_tempo, TempoCandidate};
pub use envelope::{hop_rate, onset_envelope, samples_from_s16le};
pub use normalize::normalize_bpm;
pub use octave::resolve_octave;
pub use window::select_window;

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::media::{DecodeRequest, MediaTool, PcmFormat};
use crate::types::AnalysisWindow;

/// Used when the autocorrelation yields no candidate at all.
pub const FALLBACK_BPM: f64 = 120.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TempoEstimate {
    /// Final emitted tempo.
    pub bpm: u32,
    /// Best autocorrelation candidate, if any lag fit.
    pub raw_bpm: Option<f64>,
    /// Tempo after octave resolution, before the final bias.
    pub resolved_bpm: f64,
}

/// Run the envelope-to-BPM stages on mono samples decoded at 11025 Hz.
pub fn estimate_from_samples(samples: &[f32]) -> Option<TempoEstimate> {
    let envelope = onset_envelope(samples)?;
    let hop_rate = hop_rate();

    let raw_bpm = score_tempo(&autocorrelate(&envelope), hop_rate).map(|c| c.bpm);
    let resolved_bpm = raw_bpm
        .and_then(|bpm| resolve_octave(&envelope, hop_rate, bpm))
        .or(raw_bpm)
        .unwrap_or(FALLBACK_BPM);

    let bpm = normalize_bpm(resolved_bpm)?;
    Some(TempoEstimate {
        bpm,
        raw_bpm,
        resolved_bpm,
    })
}

/// Estimate the tempo of a track. `None` when the track is too short, the
/// decode fails, or too little signal comes back; none of these are errors.
#[tracing::instrument(
    name = "tempo.estimate",
    skip_all,
    fields(
        path = %path.display(),
        duration = duration,
        window = tracing::field::Empty,
        bpm = tracing::field::Empty,
    )
)]
pub async fn estimate_tempo(
    media: &dyn MediaTool,
    path: &Path,
    duration: f64,
    cancel: &CancellationToken,
) -> Option<TempoEstimate> {
    let span = tracing::Span::current();

    let Some(window) = select_window(duration) else {
        info!(duration, "track too short for tempo analysis");
        return None;
    };
    span.record("window", format_window(&window).as_str());

    let request = DecodeRequest {
        path: path.to_path_buf(),
        window,
        sample_rate: envelope::SAMPLE_RATE,
        format: PcmFormat::S16Le,
    };

    let bytes = match media.decode_pcm(&request, cancel).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "tempo decode failed");
            return None;
        }
    };

    let samples = samples_from_s16le(&bytes);
    let Some(estimate) = estimate_from_samples(&samples) else {
        info!(samples = samples.len(), "envelope too short for tempo analysis");
        return None;
    };

    span.record("bpm", estimate.bpm);
    debug!(
        raw = ?estimate.raw_bpm,
        resolved = estimate.resolved_bpm,
        bpm = estimate.bpm,
        "tempo resolved"
    );
    Some(estimate)
}

fn format_window(window: &AnalysisWindow) -> String {
    format!("{}s-{}s", window.start, window.end())
}

/// Human tempo bucket for a BPM value.
pub fn tempo_category(bpm: u32) -> &'static str {
    match bpm {
        0..=59 => "Very Slow (Below 60 BPM)",
        60..=89 => "Slow (60-90 BPM)",
        90..=109 => "Medium (90-110 BPM)",
        110..=139 => "Upbeat (110-140 BPM)",
        140..=159 => "Fast (140-160 BPM)",
        _ => "Very Fast (160+ BPM)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono 11025 Hz click track: a short burst at every beat.
    fn click_track(bpm: f64, seconds: f64) -> Vec<f32> {
        let rate = envelope::SAMPLE_RATE as f64;
        let total = (seconds * rate) as usize;
        let period = rate * 60.0 / bpm;
        let mut samples = vec![0.0f32; total];

        let mut beat = 0.0;
        while (beat as usize) < total {
            let start = beat as usize;
            for s in samples.iter_mut().skip(start).take(200) {
                *s = 0.8;
            }
            beat += period;
        }
        samples
    }

    #[test]
    fn click_track_tempo() {
        let estimate = estimate_from_samples(&click_track(120.0, 30.0)).unwrap();
        assert!(
            (115..=125).contains(&estimate.bpm),
            "expected ~120, got {:?}",
            estimate
        );
    }

    #[test]
    fn silence_falls_back_through_the_chain() {
        // flat zero autocorrelation still produces a first-lag candidate
        let estimate = estimate_from_samples(&vec![0.0; 11_025 * 10]).unwrap();
        assert!(estimate.raw_bpm.is_some());
        assert!(estimate.bpm > 0);
    }

    #[test]
    fn short_envelope_uses_fallback_tempo() {
        // 5 frames: no lag of any band fits
        let samples = vec![0.1f32; envelope::FRAME_SIZE + 4 * envelope::HOP_SIZE + 1];
        let estimate = estimate_from_samples(&samples).unwrap();
        assert_eq!(estimate.raw_bpm, None);
        assert_eq!(estimate.resolved_bpm, FALLBACK_BPM);
        assert_eq!(estimate.bpm, 120);
    }

    #[test]
    fn too_little_audio() {
        assert!(estimate_from_samples(&[0.5; 600]).is_none());
    }

    #[test]
    fn categories() {
        assert_eq!(tempo_category(59), "Very Slow (Below 60 BPM)");
        assert_eq!(tempo_category(60), "Slow (60-90 BPM)");
        assert_eq!(tempo_category(100), "Medium (90-110 BPM)");
        assert_eq!(tempo_category(128), "Upbeat (110-140 BPM)");
        assert_eq!(tempo_category(150), "Fast (140-160 BPM)");
        assert_eq!(tempo_category(174), "Very Fast (160+ BPM)");
    }
}
