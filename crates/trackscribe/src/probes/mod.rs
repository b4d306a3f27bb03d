//! Time-bounded classification probes over several windows of a track.
//!
//! Each probe races its own deadline. A probe that misses it is cancelled
//! through its [`CancellationToken`] and its future dropped, which kills any
//! decoder still running and aborts the classifier request. Whatever the
//! surviving probes heard is OR-merged into one [`HintMap`].

pub mod classifier;
pub mod hints;

pub use classifier::{ClapService, Classifier, ClassifierHandle, LabelScore};
pub use hints::{hints_from_scores, or_hints, rescue_instruments, CLAP_LABELS, ZERO_SHOT_LABELS};

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures::future::join_all;
use scribeconf::ProbesConfig;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use crate::media::{samples_from_f32le, DecodeRequest, MediaTool, PcmFormat};
use crate::types::{AnalysisWindow, HintMap, ProbeResult, ProbeStatus};

/// Sample rate the classifier expects.
pub const PROBE_SAMPLE_RATE: u32 = 48_000;

/// Upper bound of the intro window, in seconds.
const INTRO_MAX_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Intro,
    Middle,
    Outro,
    ZeroShot,
}

impl ProbeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProbeKind::Intro => "intro",
            ProbeKind::Middle => "middle",
            ProbeKind::Outro => "outro",
            ProbeKind::ZeroShot => "zero_shot",
        }
    }
}

/// What a single probe listens to, and for how long it may take.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbePlan {
    pub kind: ProbeKind,
    /// `None` for the title-only probe.
    pub window: Option<AnalysisWindow>,
    pub deadline: Duration,
}

/// Plan the four probes for a track of `duration` seconds.
pub fn plan_probes(duration: f64, config: &ProbesConfig) -> Vec<ProbePlan> {
    let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
    let ms = Duration::from_millis;

    vec![
        ProbePlan {
            kind: ProbeKind::Intro,
            window: Some(AnalysisWindow::new(0.0, INTRO_MAX_SECS.min(duration / 3.0))),
            deadline: ms(config.intro_deadline_ms),
        },
        ProbePlan {
            kind: ProbeKind::Middle,
            window: Some(centered_window(duration, 0.5, config.window_secs)),
            deadline: ms(config.middle_deadline_ms),
        },
        ProbePlan {
            kind: ProbeKind::Outro,
            window: Some(centered_window(duration, 0.7, config.window_secs)),
            deadline: ms(config.outro_deadline_ms),
        },
        ProbePlan {
            kind: ProbeKind::ZeroShot,
            window: None,
            deadline: ms(config.zero_shot_deadline_ms),
        },
    ]
}

/// A `length`-second window centered at `fraction` of the track, shifted to
/// stay inside it.
fn centered_window(duration: f64, fraction: f64, length: f64) -> AnalysisWindow {
    let center = (fraction * duration).clamp(0.0, duration);
    let start = (center - length / 2.0).min(duration - length).max(0.0);
    AnalysisWindow::new(start, length)
}

/// Merged outcome of all probes for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub hints: HintMap,
    pub results: BTreeMap<ProbeKind, ProbeResult>,
    pub windows: BTreeMap<ProbeKind, AnalysisWindow>,
}

impl ProbeReport {
    /// Fold individual results; `ok` when any probe succeeded.
    pub fn merge(results: Vec<(ProbePlan, ProbeResult)>) -> Self {
        let mut hints = HintMap::new();
        let mut status = ProbeStatus::Skipped;
        let mut windows = BTreeMap::new();
        let mut merged = BTreeMap::new();

        for (plan, result) in results {
            if result.status.is_ok() {
                status = ProbeStatus::Ok;
                hints = or_hints(&hints, &result.hints);
            }
            if let Some(window) = plan.window {
                windows.insert(plan.kind, window);
            }
            merged.insert(plan.kind, result);
        }

        Self {
            status,
            hints,
            results: merged,
            windows,
        }
    }

    /// Top labels per probe name, for the output record.
    pub fn labels(&self) -> BTreeMap<String, Vec<String>> {
        self.results
            .iter()
            .map(|(kind, result)| (kind.name().to_string(), result.labels.clone()))
            .collect()
    }
}

/// Race `probe` against `deadline`. On expiry `cancel` is fired and the probe
/// future is dropped.
pub async fn with_deadline<F>(
    kind: ProbeKind,
    deadline: Duration,
    cancel: &CancellationToken,
    probe: F,
) -> ProbeResult
where
    F: Future<Output = ProbeResult>,
{
    tokio::select! {
        result = probe => result,
        _ = tokio::time::sleep(deadline) => {
            cancel.cancel();
            warn!(probe = kind.name(), deadline_ms = deadline.as_millis() as u64, "probe deadline exceeded");
            ProbeResult::skipped(format!("{} timeout after {}ms", kind.name(), deadline.as_millis()))
        }
    }
}

/// Everything a probe run needs.
#[derive(Clone, Copy)]
pub struct ProbeContext<'a> {
    pub media: &'a dyn MediaTool,
    pub classifier: &'a ClassifierHandle,
    pub config: &'a ProbesConfig,
}

/// Run all probes concurrently and merge what comes back.
#[tracing::instrument(
    name = "probes.run",
    skip_all,
    fields(path = %path.display(), status = tracing::field::Empty)
)]
pub async fn run_probes(
    ctx: ProbeContext<'_>,
    path: &Path,
    title: &str,
    duration: f64,
    cancel: &CancellationToken,
) -> ProbeReport {
    let plans = plan_probes(duration, ctx.config);

    let runs = plans.into_iter().map(|plan| {
        let token = cancel.child_token();
        let span = tracing::info_span!("probe", name = plan.kind.name());
        async move {
            let probe = run_probe(ctx, &plan, path, title, &token);
            let result = with_deadline(plan.kind, plan.deadline, &token, probe).await;
            debug!(status = ?result.status, error = ?result.error, "probe finished");
            (plan, result)
        }
        .instrument(span)
    });

    let report = ProbeReport::merge(join_all(runs).await);
    tracing::Span::current().record("status", format!("{:?}", report.status).as_str());
    info!(
        status = ?report.status,
        hints = report.hints.values().filter(|&&v| v).count(),
        "probes merged"
    );
    report
}

async fn run_probe(
    ctx: ProbeContext<'_>,
    plan: &ProbePlan,
    path: &Path,
    title: &str,
    cancel: &CancellationToken,
) -> ProbeResult {
    let Some(model) = ctx.classifier.get().await else {
        return ProbeResult::skipped("classifier unavailable");
    };

    let scores = match plan.window {
        Some(window) => {
            if window.length <= 0.0 {
                return ProbeResult::skipped("empty window");
            }
            let request = DecodeRequest {
                path: path.to_path_buf(),
                window,
                sample_rate: PROBE_SAMPLE_RATE,
                format: PcmFormat::F32Le,
            };
            let bytes = match ctx.media.decode_pcm(&request, cancel).await {
                Ok(bytes) => bytes,
                Err(e) => return ProbeResult::skipped(e.to_string()),
            };
            let samples = samples_from_f32le(&bytes);
            model
                .classify_audio(&samples, PROBE_SAMPLE_RATE, CLAP_LABELS, cancel)
                .await
        }
        None => {
            let title = title.trim();
            if title.is_empty() {
                return ProbeResult::skipped("no title");
            }
            model.classify_text(title, ZERO_SHOT_LABELS, cancel).await
        }
    };

    match scores {
        Ok(Some(scores)) => ProbeResult::ok(
            hints_from_scores(&scores, ctx.config.hint_threshold),
            hints::top_labels(&scores),
        ),
        Ok(None) => ProbeResult::skipped("classifier returned no result"),
        Err(e) => ProbeResult::skipped(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn window_of(plans: &[ProbePlan], kind: ProbeKind) -> AnalysisWindow {
        plans
            .iter()
            .find(|p| p.kind == kind)
            .and_then(|p| p.window)
            .unwrap()
    }

    #[test]
    fn plan_for_a_long_track() {
        let plans = plan_probes(200.0, &ProbesConfig::default());
        assert_eq!(plans.len(), 4);
        assert_eq!(window_of(&plans, ProbeKind::Intro), AnalysisWindow::new(0.0, 30.0));
        assert_eq!(window_of(&plans, ProbeKind::Middle), AnalysisWindow::new(97.5, 5.0));
        assert_eq!(window_of(&plans, ProbeKind::Outro), AnalysisWindow::new(137.5, 5.0));

        let deadlines: Vec<u128> = plans.iter().map(|p| p.deadline.as_millis()).collect();
        assert_eq!(deadlines, vec![4000, 3000, 3000, 2000]);
        assert_eq!(plans[3].window, None);
    }

    #[test]
    fn plan_for_a_short_track() {
        let plans = plan_probes(6.0, &ProbesConfig::default());
        assert_eq!(window_of(&plans, ProbeKind::Intro), AnalysisWindow::new(0.0, 2.0));
        assert_eq!(window_of(&plans, ProbeKind::Middle), AnalysisWindow::new(0.5, 5.0));
        // centered at 4.2 s the window would run past the end
        assert_eq!(window_of(&plans, ProbeKind::Outro), AnalysisWindow::new(1.0, 5.0));
    }

    #[test]
    fn windows_never_start_before_zero() {
        let plans = plan_probes(3.0, &ProbesConfig::default());
        assert_eq!(window_of(&plans, ProbeKind::Middle).start, 0.0);
        assert_eq!(window_of(&plans, ProbeKind::Outro).start, 0.0);
    }

    #[test]
    fn merge_ignores_hints_of_skipped_probes() {
        let plans = plan_probes(200.0, &ProbesConfig::default());
        let mut stale = HintMap::new();
        stale.insert("harp".to_string(), true);
        let mut skipped = ProbeResult::skipped("boom");
        skipped.hints = stale;

        let mut piano = HintMap::new();
        piano.insert("piano".to_string(), true);

        let report = ProbeReport::merge(vec![
            (plans[0].clone(), skipped),
            (plans[1].clone(), ProbeResult::ok(piano.clone(), vec!["piano".into()])),
        ]);
        assert_eq!(report.status, ProbeStatus::Ok);
        assert_eq!(report.hints, piano);
        assert_eq!(report.labels()["middle"], vec!["piano".to_string()]);
        assert_eq!(report.windows.len(), 2);
    }

    #[test]
    fn all_skipped_is_skipped() {
        let plans = plan_probes(200.0, &ProbesConfig::default());
        let report = ProbeReport::merge(
            plans
                .into_iter()
                .map(|p| (p, ProbeResult::skipped("nope")))
                .collect(),
        );
        assert_eq!(report.status, ProbeStatus::Skipped);
        assert!(report.hints.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_and_skips() {
        let token = CancellationToken::new();
        let watched = token.clone();
        let result = with_deadline(
            ProbeKind::Middle,
            Duration::from_millis(3000),
            &token,
            async move {
                watched.cancelled().await;
                ProbeResult::ok(HintMap::new(), Vec::new())
            },
        )
        .await;

        assert_eq!(result.status, ProbeStatus::Skipped);
        assert_eq!(result.error.as_deref(), Some("middle timeout after 3000ms"));
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_probe_beats_deadline() {
        let token = CancellationToken::new();
        let result = with_deadline(
            ProbeKind::ZeroShot,
            Duration::from_millis(2000),
            &token,
            async { ProbeResult::ok(HintMap::new(), vec!["x".into()]) },
        )
        .await;
        assert!(result.status.is_ok());
        assert!(!token.is_cancelled());
    }
}
