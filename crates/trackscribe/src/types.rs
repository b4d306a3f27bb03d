use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Boolean feature flags keyed by instrument/vocal name, merged by OR.
pub type HintMap = BTreeMap<String, bool>;

/// A sub-interval of a track, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub start: f64,
    pub length: f64,
}

impl AnalysisWindow {
    pub fn new(start: f64, length: f64) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

/// Container and stream facts reported by the metadata probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub duration_sec: f64,
    pub bit_rate: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: String,
}

/// EBU R128 measurements. Absent values were not measurable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Loudness {
    pub lufs_integrated: Option<f64>,
    pub loudness_range: Option<f64>,
    pub true_peak_db: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    Skipped,
}

impl ProbeStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeStatus::Ok)
    }
}

/// Outcome of one classification probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub hints: HintMap,
    /// Labels ordered by descending score, top ten.
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn ok(hints: HintMap, labels: Vec<String>) -> Self {
        Self {
            status: ProbeStatus::Ok,
            hints,
            labels,
            error: None,
        }
    }

    pub fn skipped(error: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Skipped,
            hints: HintMap::new(),
            labels: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Taxonomy-constrained description of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreativeResult {
    pub mood: Vec<String>,
    pub genre: Vec<String>,
    pub theme: Vec<String>,
    pub instrument: Vec<String>,
    /// Never empty; `["No Vocals"]` when nothing was detected.
    pub vocals: Vec<String>,
    #[serde(rename = "lyricThemes")]
    pub lyric_themes: Vec<String>,
    pub narrative: String,
    /// Always within [0, 1].
    pub confidence: f64,
}

pub const NO_VOCALS: &str = "No Vocals";

/// Whether a normalized vocal list says the track has no vocals.
pub fn is_no_vocals(vocals: &[String]) -> bool {
    matches!(vocals, [only] if only == NO_VOCALS)
}

impl CreativeResult {
    /// Record used whenever the description service cannot deliver.
    pub fn unavailable() -> Self {
        Self {
            mood: Vec::new(),
            genre: Vec::new(),
            theme: Vec::new(),
            instrument: Vec::new(),
            vocals: vec![NO_VOCALS.to_string()],
            lyric_themes: Vec::new(),
            narrative: "Creative analysis unavailable".to_string(),
            confidence: 0.0,
        }
    }

    pub fn has_vocals(&self) -> bool {
        !is_no_vocals(&self.vocals)
    }
}

/// How the description-generation step ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CreativeStatus {
    Complete,
    Offline,
    ModelMissing { remediation: String },
    Error { message: String },
    Disabled,
}

impl CreativeStatus {
    /// One-line summary stored alongside the record.
    pub fn status_line(&self) -> String {
        match self {
            CreativeStatus::Complete => "Creative analysis complete".to_string(),
            CreativeStatus::Offline => "Ollama offline - creative analysis skipped".to_string(),
            CreativeStatus::ModelMissing { remediation } => {
                format!("Model not installed - creative analysis skipped ({})", remediation)
            }
            CreativeStatus::Error { .. } => "Creative analysis error - using defaults".to_string(),
            CreativeStatus::Disabled => "Creative analysis disabled".to_string(),
        }
    }
}

/// Result plus status of the description-generation step.
#[derive(Debug, Clone, PartialEq)]
pub struct CreativeOutcome {
    pub result: CreativeResult,
    pub status: CreativeStatus,
}

impl CreativeOutcome {
    pub fn degraded(status: CreativeStatus) -> Self {
        Self {
            result: CreativeResult::unavailable(),
            status,
        }
    }
}

/// Everything known about one analyzed track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecord {
    pub file: String,
    pub path: String,
    /// RFC 3339 timestamp
    pub analyzed_at: String,
    pub has_wav_version: bool,

    pub duration_sec: f64,
    pub bit_rate: u64,
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: String,

    pub lufs_integrated: Option<f64>,
    pub loudness_range: Option<f64>,
    pub true_peak_db: Option<f64>,

    pub estimated_tempo_bpm: Option<u32>,
    pub tempo_category: Option<String>,

    pub hints: HintMap,
    pub probe_status: ProbeStatus,
    pub probe_labels: BTreeMap<String, Vec<String>>,

    pub creative: CreativeResult,
    pub creative_status: String,
    pub creative_state: CreativeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_creative_keeps_vocals_non_empty() {
        let creative = CreativeResult::unavailable();
        assert_eq!(creative.vocals, vec!["No Vocals"]);
        assert!(!creative.has_vocals());
        assert_eq!(creative.confidence, 0.0);
    }

    #[test]
    fn no_vocals_only_when_alone() {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(is_no_vocals(&list(&["No Vocals"])));
        assert!(!is_no_vocals(&list(&["No Vocals", "Lead Vocals"])));
        assert!(!is_no_vocals(&list(&["Female Vocals"])));
        assert!(!is_no_vocals(&[]));
    }

    #[test]
    fn creative_serializes_lyric_themes_camel_case() {
        let json = serde_json::to_value(CreativeResult::unavailable()).unwrap();
        assert!(json.get("lyricThemes").is_some());
        assert!(json.get("lyric_themes").is_none());
    }

    #[test]
    fn status_lines_match_record_vocabulary() {
        assert_eq!(
            CreativeStatus::Offline.status_line(),
            "Ollama offline - creative analysis skipped"
        );
        assert_eq!(
            CreativeStatus::Error {
                message: "bad json".into()
            }
            .status_line(),
            "Creative analysis error - using defaults"
        );
        assert!(CreativeStatus::ModelMissing {
            remediation: "ollama pull qwen3:8b".into()
        }
        .status_line()
        .contains("ollama pull qwen3:8b"));
    }

    #[test]
    fn creative_status_is_tagged() {
        let json = serde_json::to_value(CreativeStatus::ModelMissing {
            remediation: "ollama pull x".into(),
        })
        .unwrap();
        assert_eq!(json["state"], "model_missing");
        assert_eq!(json["remediation"], "ollama pull x");
    }
}
