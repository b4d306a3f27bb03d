//! Audio track analysis: tempo, classification hints and a taxonomy-checked
//! creative description, emitted as one JSON record per track.
//!
//! Technical results (metadata, loudness, tempo) never depend on the
//! networked collaborators. The classifier and the inference service only
//! add to a record, and when they fail the record falls back to defaults.

pub mod analyzer;
pub mod creative;
pub mod error;
pub mod media;
pub mod probes;
pub mod taxonomy;
pub mod tempo;
pub mod types;

pub use analyzer::AnalysisContext;
pub use creative::{CreativeRequest, InferenceClient};
pub use error::{ClassifierError, InferenceError, MediaError, TaxonomyError};
pub use media::{DecodeRequest, Ffmpeg, MediaTool, PcmFormat};
pub use probes::{Classifier, ClassifierHandle, LabelScore, ProbeReport};
pub use taxonomy::Taxonomy;
pub use tempo::{estimate_tempo, TempoEstimate};
pub use types::{
    AnalysisWindow, CreativeOutcome, CreativeResult, CreativeStatus, HintMap, Loudness,
    ProbeResult, ProbeStatus, TrackMetadata, TrackRecord,
};
