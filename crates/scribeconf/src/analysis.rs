//! Analysis tuning - deadlines, thresholds and taxonomy limits.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Classification probe deadlines and window shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbesConfig {
    /// Intro window probe deadline.
    /// Default: 4000
    #[serde(default = "ProbesConfig::default_intro_deadline_ms")]
    pub intro_deadline_ms: u64,

    /// Middle (50%) window probe deadline.
    /// Default: 3000
    #[serde(default = "ProbesConfig::default_middle_deadline_ms")]
    pub middle_deadline_ms: u64,

    /// Outro (70%) window probe deadline.
    /// Default: 3000
    #[serde(default = "ProbesConfig::default_outro_deadline_ms")]
    pub outro_deadline_ms: u64,

    /// Title-only zero-shot probe deadline.
    /// Default: 2000
    #[serde(default = "ProbesConfig::default_zero_shot_deadline_ms")]
    pub zero_shot_deadline_ms: u64,

    /// Length of the middle and outro windows in seconds.
    /// Default: 5.0
    #[serde(default = "ProbesConfig::default_window_secs")]
    pub window_secs: f64,

    /// Minimum label score for a hint to fire.
    /// Default: 0.15
    #[serde(default = "ProbesConfig::default_hint_threshold")]
    pub hint_threshold: f64,
}

impl ProbesConfig {
    fn default_intro_deadline_ms() -> u64 {
        4_000
    }

    fn default_middle_deadline_ms() -> u64 {
        3_000
    }

    fn default_outro_deadline_ms() -> u64 {
        3_000
    }

    fn default_zero_shot_deadline_ms() -> u64 {
        2_000
    }

    fn default_window_secs() -> f64 {
        5.0
    }

    fn default_hint_threshold() -> f64 {
        0.15
    }
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            intro_deadline_ms: Self::default_intro_deadline_ms(),
            middle_deadline_ms: Self::default_middle_deadline_ms(),
            outro_deadline_ms: Self::default_outro_deadline_ms(),
            zero_shot_deadline_ms: Self::default_zero_shot_deadline_ms(),
            window_secs: Self::default_window_secs(),
            hint_threshold: Self::default_hint_threshold(),
        }
    }
}

/// Taxonomy source and list limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    /// Replace the built-in taxonomy with this TOML file.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Maximum number of instruments kept in a creative result.
    /// Default: 8
    #[serde(default = "TaxonomyConfig::default_instrument_cap")]
    pub instrument_cap: usize,
}

impl TaxonomyConfig {
    fn default_instrument_cap() -> usize {
        8
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            path: None,
            instrument_cap: Self::default_instrument_cap(),
        }
    }
}

/// All analysis sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub probes: ProbesConfig,

    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
}
