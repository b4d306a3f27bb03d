//! Service configuration - where the collaborators of the analysis live.

use serde::{Deserialize, Serialize};

/// Local inference service (Ollama-compatible chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of the service.
    /// Default: http://127.0.0.1:11434
    #[serde(default = "InferenceConfig::default_url")]
    pub url: String,

    /// Model used for description generation.
    /// Default: qwen3:8b
    #[serde(default = "InferenceConfig::default_model")]
    pub model: String,

    /// Per-request timeout in milliseconds. Local models are slow on first load.
    /// Default: 120000 (2 min)
    #[serde(default = "InferenceConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total attempts for the description request.
    /// Default: 2
    #[serde(default = "InferenceConfig::default_attempts")]
    pub attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    /// Default: 1000
    #[serde(default = "InferenceConfig::default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl InferenceConfig {
    fn default_url() -> String {
        "http://127.0.0.1:11434".to_string()
    }

    fn default_model() -> String {
        "qwen3:8b".to_string()
    }

    fn default_timeout_ms() -> u64 {
        120_000
    }

    fn default_attempts() -> u32 {
        2
    }

    fn default_retry_backoff_ms() -> u64 {
        1_000
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            model: Self::default_model(),
            timeout_ms: Self::default_timeout_ms(),
            attempts: Self::default_attempts(),
            retry_backoff_ms: Self::default_retry_backoff_ms(),
        }
    }
}

/// Audio/text classification service used by the probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL of the CLAP-style classification service.
    /// Default: http://127.0.0.1:2007
    #[serde(default = "ClassifierConfig::default_url")]
    pub url: String,

    /// When false, every probe reports `skipped` without touching the network.
    /// Default: true
    #[serde(default = "ClassifierConfig::default_enabled")]
    pub enabled: bool,
}

impl ClassifierConfig {
    fn default_url() -> String {
        "http://127.0.0.1:2007".to_string()
    }

    fn default_enabled() -> bool {
        true
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            enabled: Self::default_enabled(),
        }
    }
}

/// External media binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default: ffmpeg (resolved through PATH)
    #[serde(default = "ToolsConfig::default_ffmpeg")]
    pub ffmpeg: String,

    /// Default: ffprobe (resolved through PATH)
    #[serde(default = "ToolsConfig::default_ffprobe")]
    pub ffprobe: String,
}

impl ToolsConfig {
    fn default_ffmpeg() -> String {
        "ffmpeg".to_string()
    }

    fn default_ffprobe() -> String {
        "ffprobe".to_string()
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: Self::default_ffmpeg(),
            ffprobe: Self::default_ffprobe(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or full EnvFilter directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export.
    /// Default: "" (disabled)
    #[serde(default)]
    pub otlp_endpoint: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: String::new(),
        }
    }
}

/// All service sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}
