//! Closed vocabularies and the synonym tables that map free-form labels onto them.
//!
//! The taxonomy is versioned TOML data. A copy is compiled into the binary and
//! can be replaced wholesale by pointing `[taxonomy] path` at another file.
//! It is loaded once at startup and shared behind an `Arc`.

mod confidence;
pub mod normalize;

pub use confidence::{parse_confidence, CREATIVE_DEFAULT_CONFIDENCE};

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use scribeconf::TaxonomyConfig;
use serde::Deserialize;
use tracing::debug;

use crate::error::TaxonomyError;
use crate::types::NO_VOCALS;

/// Taxonomy file format version understood by this build.
pub const SUPPORTED_VERSION: u32 = 1;

const BUILTIN: &str = include_str!("taxonomy.toml");

/// Named vocabularies of the taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    Mood,
    Genre,
    Theme,
    Instrument,
    Vocals,
    LyricThemes,
}

#[derive(Debug, Clone, Deserialize)]
struct TaxonomyFile {
    version: u32,
    vocabulary: Vocabularies,
    #[serde(default)]
    synonyms: SynonymTables,
    strings_guard: StringsGuard,
    #[serde(default)]
    hint_instruments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Vocabularies {
    mood: Vec<String>,
    genre: Vec<String>,
    theme: Vec<String>,
    instrument: Vec<String>,
    vocals: Vec<String>,
    lyric_themes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SynonymTables {
    #[serde(default)]
    instrument: BTreeMap<String, String>,
    #[serde(default)]
    vocals: BTreeMap<String, String>,
}

/// Ensemble label that is dropped when only pad-like sources back it up.
#[derive(Debug, Clone, Deserialize)]
pub struct StringsGuard {
    pub ensemble: String,
    pub bowed: Vec<String>,
    pub pads: Vec<String>,
}

/// Loaded, validated taxonomy.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    version: u32,
    vocabularies: Vocabularies,
    instrument_synonyms: HashMap<String, String>,
    vocal_synonyms: HashMap<String, String>,
    strings_guard: StringsGuard,
    hint_instruments: BTreeMap<String, String>,
}

/// Matching key for labels: trimmed and lowercased.
pub(crate) fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl Taxonomy {
    /// The taxonomy compiled into the binary.
    pub fn builtin() -> Result<Self, TaxonomyError> {
        Self::from_toml_str(BUILTIN)
    }

    /// Load from config: the override file when set, the built-in data otherwise.
    pub fn load(config: &TaxonomyConfig) -> Result<Self, TaxonomyError> {
        match &config.path {
            Some(path) => Self::from_path(path),
            None => Self::builtin(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, TaxonomyError> {
        let contents = std::fs::read_to_string(path).map_err(|e| TaxonomyError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(path = %path.display(), "loading taxonomy override");
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = toml::from_str(contents)?;
        Self::from_file(file)
    }

    fn from_file(file: TaxonomyFile) -> Result<Self, TaxonomyError> {
        if file.version != SUPPORTED_VERSION {
            return Err(TaxonomyError::UnsupportedVersion {
                found: file.version,
                supported: SUPPORTED_VERSION,
            });
        }

        let instrument_synonyms = synonym_map(&file.synonyms.instrument);
        let vocal_synonyms = synonym_map(&file.synonyms.vocals);

        let taxonomy = Self {
            version: file.version,
            vocabularies: file.vocabulary,
            instrument_synonyms,
            vocal_synonyms,
            strings_guard: file.strings_guard,
            hint_instruments: file.hint_instruments,
        };
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    fn validate(&self) -> Result<(), TaxonomyError> {
        for (key, target) in &self.instrument_synonyms {
            if self.canonical(Vocabulary::Instrument, target).is_none() {
                return Err(TaxonomyError::Invalid(format!(
                    "instrument synonym {:?} maps to unknown instrument {:?}",
                    key, target
                )));
            }
            if self.vocal_synonyms.contains_key(key) {
                return Err(TaxonomyError::Invalid(format!(
                    "synonym {:?} appears in both the instrument and vocal tables",
                    key
                )));
            }
        }

        for (key, target) in &self.vocal_synonyms {
            if self.canonical(Vocabulary::Vocals, target).is_none() {
                return Err(TaxonomyError::Invalid(format!(
                    "vocal synonym {:?} maps to unknown vocal type {:?}",
                    key, target
                )));
            }
        }

        if self.canonical(Vocabulary::Vocals, NO_VOCALS).is_none() {
            return Err(TaxonomyError::Invalid(format!(
                "vocals vocabulary must contain {:?}",
                NO_VOCALS
            )));
        }

        let guard = &self.strings_guard;
        let guard_labels = std::iter::once(&guard.ensemble)
            .chain(guard.bowed.iter())
            .chain(guard.pads.iter());
        for label in guard_labels {
            if self.canonical(Vocabulary::Instrument, label).is_none() {
                return Err(TaxonomyError::Invalid(format!(
                    "strings guard references unknown instrument {:?}",
                    label
                )));
            }
        }

        for (hint, target) in &self.hint_instruments {
            if self.canonical(Vocabulary::Instrument, target).is_none() {
                return Err(TaxonomyError::Invalid(format!(
                    "hint {:?} maps to unknown instrument {:?}",
                    hint, target
                )));
            }
        }

        Ok(())
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn vocabulary(&self, which: Vocabulary) -> &[String] {
        let v = &self.vocabularies;
        match which {
            Vocabulary::Mood => &v.mood,
            Vocabulary::Genre => &v.genre,
            Vocabulary::Theme => &v.theme,
            Vocabulary::Instrument => &v.instrument,
            Vocabulary::Vocals => &v.vocals,
            Vocabulary::LyricThemes => &v.lyric_themes,
        }
    }

    /// Case- and whitespace-insensitive exact match against a vocabulary.
    pub fn canonical(&self, which: Vocabulary, raw: &str) -> Option<&str> {
        let key = normalize_key(raw);
        self.vocabulary(which)
            .iter()
            .find(|entry| normalize_key(entry) == key)
            .map(String::as_str)
    }

    pub(crate) fn instrument_synonym(&self, key: &str) -> Option<&str> {
        self.instrument_synonyms.get(key).map(String::as_str)
    }

    pub(crate) fn vocal_synonym(&self, key: &str) -> Option<&str> {
        self.vocal_synonyms.get(key).map(String::as_str)
    }

    pub fn strings_guard(&self) -> &StringsGuard {
        &self.strings_guard
    }

    /// Canonical instrument implied by a probe hint key.
    pub fn hint_instrument(&self, hint: &str) -> Option<&str> {
        self.hint_instruments.get(hint).map(String::as_str)
    }
}

fn synonym_map(table: &BTreeMap<String, String>) -> HashMap<String, String> {
    table
        .iter()
        .map(|(key, target)| (normalize_key(key), target.clone()))
        .collect()
}
