use std::path::PathBuf;

use thiserror::Error;

/// Failures of the external media tools (ffprobe / ffmpeg).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    Exit {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("{tool} produced no data")]
    Empty { tool: String },

    #[error("malformed probe output: {0}")]
    Malformed(String),

    #[error("{tool} cancelled")]
    Cancelled { tool: String },
}

/// Failures talking to the local inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference service offline at {url}: {message}")]
    Offline { url: String, message: String },

    #[error("model {model} is not installed")]
    ModelMissing { model: String },

    #[error("inference service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed model output: {0}")]
    Malformed(String),
}

/// Failures of the classification service behind the probes.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    Malformed(String),

    #[error("classification cancelled")]
    Cancelled,
}

/// Failures loading or validating taxonomy data.
#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to read taxonomy {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse taxonomy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("taxonomy version {found} is not supported (expected {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid taxonomy: {0}")]
    Invalid(String),
}
