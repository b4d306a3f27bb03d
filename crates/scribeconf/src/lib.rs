//! Configuration loading for trackscribe.
//!
//! Configuration is split into two sections:
//!
//! - **Services** (`ServicesConfig`): where the collaborators live - the local
//!   inference service, the classification service, the media tool binaries,
//!   and telemetry.
//!
//! - **Analysis** (`AnalysisConfig`): knobs of the analysis itself - probe
//!   deadlines, hint threshold, instrument cap, taxonomy override.
//!
//! # Usage
//!
//! ```rust,no_run
//! use scribeconf::ScribeConfig;
//!
//! let (config, sources) = ScribeConfig::load_with_sources_from(None).expect("Failed to load config");
//!
//! println!("Loaded {} config files", sources.files.len());
//!
//! println!("Inference: {} ({})", config.services.inference.url, config.services.inference.model);
//! println!("Intro probe deadline: {}ms", config.analysis.probes.intro_deadline_ms);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/trackscribe/config.toml` (system)
//! 2. `~/.config/trackscribe/config.toml` (user)
//! 3. `./trackscribe.toml` (local override, replaced by `--config` when given)
//! 4. Environment variables (`TRACKSCRIBE_*`, `OLLAMA_HOST`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [inference]
//! url = "http://127.0.0.1:11434"
//! model = "qwen3:8b"
//! attempts = 2
//!
//! [classifier]
//! url = "http://127.0.0.1:2007"
//!
//! [tools]
//! ffmpeg = "/usr/bin/ffmpeg"
//!
//! [telemetry]
//! log_level = "info"
//!
//! [probes]
//! intro_deadline_ms = 4000
//!
//! [taxonomy]
//! instrument_cap = 8
//! ```

pub mod analysis;
pub mod loader;
pub mod services;

pub use analysis::{AnalysisConfig, ProbesConfig, TaxonomyConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use services::{ClassifierConfig, InferenceConfig, ServicesConfig, TelemetryConfig, ToolsConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete trackscribe configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScribeConfig {
    /// Collaborator endpoints and binaries.
    #[serde(flatten)]
    pub services: ServicesConfig,

    /// Analysis tuning.
    #[serde(flatten)]
    pub analysis: AnalysisConfig,
}

impl ScribeConfig {
    /// Load configuration from all sources and report where values came from.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/trackscribe/config.toml`
    /// 3. `~/.config/trackscribe/config.toml`
    /// 4. `config_path` if given and present, else `./trackscribe.toml`
    /// 5. Environment variables
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Build TOML manually for nicer formatting
        let mut output = String::new();
        let services = &self.services;
        let analysis = &self.analysis;

        output.push_str("# trackscribe configuration\n\n");

        output.push_str("[inference]\n");
        output.push_str(&format!("url = \"{}\"\n", services.inference.url));
        output.push_str(&format!("model = \"{}\"\n", services.inference.model));
        output.push_str(&format!("timeout_ms = {}\n", services.inference.timeout_ms));
        output.push_str(&format!("attempts = {}\n", services.inference.attempts));
        output.push_str(&format!(
            "retry_backoff_ms = {}\n",
            services.inference.retry_backoff_ms
        ));

        output.push_str("\n[classifier]\n");
        output.push_str(&format!("url = \"{}\"\n", services.classifier.url));
        output.push_str(&format!("enabled = {}\n", services.classifier.enabled));

        output.push_str("\n[tools]\n");
        output.push_str(&format!("ffmpeg = \"{}\"\n", services.tools.ffmpeg));
        output.push_str(&format!("ffprobe = \"{}\"\n", services.tools.ffprobe));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", services.telemetry.log_level));
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            services.telemetry.otlp_endpoint
        ));

        output.push_str("\n[probes]\n");
        output.push_str(&format!(
            "intro_deadline_ms = {}\n",
            analysis.probes.intro_deadline_ms
        ));
        output.push_str(&format!(
            "middle_deadline_ms = {}\n",
            analysis.probes.middle_deadline_ms
        ));
        output.push_str(&format!(
            "outro_deadline_ms = {}\n",
            analysis.probes.outro_deadline_ms
        ));
        output.push_str(&format!(
            "zero_shot_deadline_ms = {}\n",
            analysis.probes.zero_shot_deadline_ms
        ));
        output.push_str(&format!("window_secs = {:?}\n", analysis.probes.window_secs));
        output.push_str(&format!(
            "hint_threshold = {:?}\n",
            analysis.probes.hint_threshold
        ));

        output.push_str("\n[taxonomy]\n");
        output.push_str(&format!(
            "instrument_cap = {}\n",
            analysis.taxonomy.instrument_cap
        ));
        if let Some(path) = &analysis.taxonomy.path {
            output.push_str(&format!("path = \"{}\"\n", path.display()));
        }

        output
    }
}
