//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ScribeConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, optionally with a CLI
/// override path. Only returns files that exist.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    // System config
    let system = PathBuf::from("/etc/trackscribe/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("trackscribe/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("trackscribe.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a config file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deserialize a merged table, filling gaps with compiled defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<ScribeConfig, ConfigError> {
    let mut config: ScribeConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;

    if let Some(path) = config.analysis.taxonomy.path.take() {
        config.analysis.taxonomy.path = Some(expand_path(&path.to_string_lossy()));
    }

    Ok(config)
}

/// Merge `overlay` into `base`, recursing into nested tables.
///
/// Scalars and arrays in the overlay replace the base value.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut ScribeConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit variable list.
pub fn apply_overrides_from<I>(config: &mut ScribeConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let services = &mut config.services;
    let analysis = &mut config.analysis;

    for (key, value) in vars {
        let applied = match key.as_str() {
            "TRACKSCRIBE_INFERENCE_URL" => {
                services.inference.url = value;
                true
            }
            // Ollama's own variable is usually host:port without a scheme
            "OLLAMA_HOST" => {
                services.inference.url = if value.contains("://") {
                    value
                } else {
                    format!("http://{}", value)
                };
                true
            }
            "TRACKSCRIBE_MODEL" => {
                services.inference.model = value;
                true
            }
            "TRACKSCRIBE_CLASSIFIER_URL" => {
                services.classifier.url = value;
                true
            }
            "TRACKSCRIBE_CLASSIFIER_ENABLED" => match value.parse() {
                Ok(enabled) => {
                    services.classifier.enabled = enabled;
                    true
                }
                Err(_) => false,
            },
            "TRACKSCRIBE_FFMPEG" => {
                services.tools.ffmpeg = value;
                true
            }
            "TRACKSCRIBE_FFPROBE" => {
                services.tools.ffprobe = value;
                true
            }
            "TRACKSCRIBE_LOG_LEVEL" | "RUST_LOG" => {
                services.telemetry.log_level = value;
                true
            }
            "TRACKSCRIBE_OTLP_ENDPOINT" | "OTEL_EXPORTER_OTLP_ENDPOINT" => {
                services.telemetry.otlp_endpoint = value;
                true
            }
            "TRACKSCRIBE_TAXONOMY" => {
                analysis.taxonomy.path = Some(expand_path(&value));
                true
            }
            "TRACKSCRIBE_INSTRUMENT_CAP" => match value.parse() {
                Ok(cap) => {
                    analysis.taxonomy.instrument_cap = cap;
                    true
                }
                Err(_) => false,
            },
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn parse(toml: &str) -> ScribeConfig {
        from_table(toml.parse().unwrap(), Path::new("test.toml")).unwrap()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_cli_path_loads_last() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let files = discover_config_files_with_override(Some(file.path()));
        assert_eq!(files.last().map(PathBuf::as_path), Some(file.path()));

        let missing = Path::new("/nonexistent/trackscribe.toml");
        assert!(!discover_config_files_with_override(Some(missing)).contains(&missing.to_path_buf()));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = parse(
            r#"
[inference]
model = "llama3.1:8b"
"#,
        );
        assert_eq!(config.services.inference.model, "llama3.1:8b");
        // Other values should be defaults
        assert_eq!(config.services.inference.url, "http://127.0.0.1:11434");
        assert_eq!(config.analysis.probes.middle_deadline_ms, 3000);
    }

    #[test]
    fn test_parse_full_toml() {
        let config = parse(
            r#"
[inference]
url = "http://gpu-box:11434"
model = "qwen2.5:14b"
attempts = 3
retry_backoff_ms = 250

[classifier]
url = "http://gpu-box:2007"
enabled = false

[tools]
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

[telemetry]
log_level = "debug"

[probes]
intro_deadline_ms = 6000
window_secs = 8.0
hint_threshold = 0.2

[taxonomy]
path = "/etc/trackscribe/taxonomy.toml"
instrument_cap = 5
"#,
        );

        assert_eq!(config.services.inference.url, "http://gpu-box:11434");
        assert_eq!(config.services.inference.attempts, 3);
        assert_eq!(config.services.inference.retry_backoff_ms, 250);
        assert!(!config.services.classifier.enabled);
        assert_eq!(config.services.tools.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.services.tools.ffprobe, "ffprobe");
        assert_eq!(config.services.telemetry.log_level, "debug");
        assert_eq!(config.analysis.probes.intro_deadline_ms, 6000);
        assert_eq!(config.analysis.probes.window_secs, 8.0);
        assert_eq!(config.analysis.probes.hint_threshold, 0.2);
        assert_eq!(
            config.analysis.taxonomy.path,
            Some(PathBuf::from("/etc/trackscribe/taxonomy.toml"))
        );
        assert_eq!(config.analysis.taxonomy.instrument_cap, 5);
    }

    #[test]
    fn test_merge_tables_later_wins_per_key() {
        let mut base: toml::Table = r#"
[inference]
url = "http://a:1"
model = "base-model"
"#
        .parse()
        .unwrap();
        let overlay: toml::Table = r#"
[inference]
model = "overlay-model"
"#
        .parse()
        .unwrap();

        merge_tables(&mut base, overlay);
        let config = from_table(base, Path::new("merged.toml")).unwrap();
        assert_eq!(config.services.inference.url, "http://a:1");
        assert_eq!(config.services.inference.model, "overlay-model");
    }

    #[test]
    fn test_invalid_type_reports_path() {
        let table: toml::Table = "[probes]\nintro_deadline_ms = \"soon\"\n".parse().unwrap();
        let err = from_table(table, Path::new("bad.toml")).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_load_table_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[taxonomy]\ninstrument_cap = 3").unwrap();
        let config = from_table(load_table(file.path()).unwrap(), file.path()).unwrap();
        assert_eq!(config.analysis.taxonomy.instrument_cap, 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ScribeConfig::default();
        let mut sources = ConfigSources::default();
        let vars = vec![
            ("OLLAMA_HOST".to_string(), "10.0.0.5:11434".to_string()),
            ("TRACKSCRIBE_MODEL".to_string(), "gemma2:9b".to_string()),
            ("TRACKSCRIBE_INSTRUMENT_CAP".to_string(), "not-a-number".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];

        apply_overrides_from(&mut config, &mut sources, vars);

        assert_eq!(config.services.inference.url, "http://10.0.0.5:11434");
        assert_eq!(config.services.inference.model, "gemma2:9b");
        assert_eq!(config.analysis.taxonomy.instrument_cap, 8);
        assert_eq!(sources.env_overrides, vec!["OLLAMA_HOST", "TRACKSCRIBE_MODEL"]);
    }
}
