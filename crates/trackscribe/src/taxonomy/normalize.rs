//! Mapping model output onto the taxonomy.
//!
//! Labels resolve synonym-table-first, then by case-insensitive exact match
//! against the canonical vocabulary. Anything else is silently dropped.
//! Instrument and vocal labels each resolve through their own table only.

use std::collections::HashSet;

use serde_json::Value;

use super::{normalize_key, parse_confidence, Taxonomy, Vocabulary};
use crate::types::{is_no_vocals, CreativeResult, NO_VOCALS};

/// Longest narrative kept in a record, in characters.
pub const NARRATIVE_MAX_CHARS: usize = 200;

const DEFAULT_NARRATIVE: &str = "No description available";

impl Taxonomy {
    /// Resolve one free-form instrument label.
    pub fn resolve_instrument(&self, raw: &str) -> Option<String> {
        let key = normalize_key(raw);
        if key.is_empty() {
            return None;
        }
        self.instrument_synonym(&key)
            .or_else(|| self.canonical(Vocabulary::Instrument, &key))
            .map(str::to_string)
    }

    /// Resolve one free-form vocal label.
    pub fn resolve_vocal(&self, raw: &str) -> Option<String> {
        let key = normalize_key(raw);
        if key.is_empty() {
            return None;
        }
        self.vocal_synonym(&key)
            .or_else(|| self.canonical(Vocabulary::Vocals, &key))
            .map(str::to_string)
    }

    /// Normalize, dedupe, guard and cap an instrument list.
    pub fn normalize_instruments<S: AsRef<str>>(&self, raw: &[S], cap: usize) -> Vec<String> {
        let resolved = raw.iter().filter_map(|r| self.resolve_instrument(r.as_ref()));
        self.finish_instruments(resolved, cap)
    }

    /// Append instruments to an already-normalized list. Existing entries are
    /// never removed or reordered; additions outside the taxonomy are dropped,
    /// and additions stop once the list reaches `cap`.
    ///
    /// The strings guard only vetoes an added ensemble label.
    pub fn merge_instruments<S: AsRef<str>>(
        &self,
        existing: &[String],
        additions: &[S],
        cap: usize,
    ) -> Vec<String> {
        let mut additions: Vec<String> = dedupe(
            additions
                .iter()
                .filter_map(|r| self.resolve_instrument(r.as_ref())),
        )
        .into_iter()
        .filter(|a| !existing.contains(a))
        .collect();

        let combined: Vec<String> = existing.iter().chain(additions.iter()).cloned().collect();
        if self.strings_guard_fires(&combined) {
            let ensemble = &self.strings_guard().ensemble;
            additions.retain(|a| a != ensemble);
        }

        let mut merged = existing.to_vec();
        let room = cap.saturating_sub(merged.len());
        merged.extend(additions.into_iter().take(room));
        merged
    }

    fn finish_instruments(&self, resolved: impl Iterator<Item = String>, cap: usize) -> Vec<String> {
        let mut list = self.apply_strings_guard(dedupe(resolved));
        list.truncate(cap);
        list
    }

    /// Normalize a vocal list. Never returns an empty list.
    ///
    /// "No Vocals" is dropped when a concrete vocal type is also present.
    pub fn normalize_vocals<S: AsRef<str>>(&self, raw: &[S]) -> Vec<String> {
        let mut vocals = dedupe(raw.iter().filter_map(|r| self.resolve_vocal(r.as_ref())));

        if vocals.iter().any(|v| v != NO_VOCALS) {
            vocals.retain(|v| v != NO_VOCALS);
        }
        if vocals.is_empty() {
            vocals.push(NO_VOCALS.to_string());
        }
        vocals
    }

    /// Keep canonical members of a vocabulary, deduplicated, in input order.
    pub fn filter_vocabulary<S: AsRef<str>>(&self, which: Vocabulary, raw: &[S]) -> Vec<String> {
        dedupe(
            raw.iter()
                .filter_map(|r| self.canonical(which, r.as_ref()))
                .map(str::to_string),
        )
    }

    /// Whether the ensemble strings label is present with no bowed member
    /// backing it up and a pad-like instrument alongside.
    fn strings_guard_fires(&self, list: &[String]) -> bool {
        let guard = self.strings_guard();
        let has = |name: &String| list.contains(name);

        has(&guard.ensemble) && !guard.bowed.iter().any(has) && guard.pads.iter().any(has)
    }

    /// Drop the ensemble strings label when the guard fires.
    pub fn apply_strings_guard(&self, list: Vec<String>) -> Vec<String> {
        if self.strings_guard_fires(&list) {
            let ensemble = &self.strings_guard().ensemble;
            list.into_iter().filter(|l| l != ensemble).collect()
        } else {
            list
        }
    }

    /// Turn the model's JSON object into a taxonomy-constrained result.
    pub fn validate_creative(
        &self,
        raw: &Value,
        instrument_cap: usize,
        default_confidence: f64,
    ) -> CreativeResult {
        let vocals = self.normalize_vocals(&string_list(raw.get("vocals")));
        let has_vocals = !is_no_vocals(&vocals);

        let lyric_themes = if has_vocals {
            self.filter_vocabulary(Vocabulary::LyricThemes, &string_list(raw.get("lyricThemes")))
        } else {
            Vec::new()
        };

        let narrative = match raw.get("narrative").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => text.chars().take(NARRATIVE_MAX_CHARS).collect(),
            _ => DEFAULT_NARRATIVE.to_string(),
        };

        CreativeResult {
            mood: self.filter_vocabulary(Vocabulary::Mood, &string_list(raw.get("mood"))),
            genre: self.filter_vocabulary(Vocabulary::Genre, &string_list(raw.get("genre"))),
            theme: self.filter_vocabulary(Vocabulary::Theme, &string_list(raw.get("theme"))),
            instrument: self
                .normalize_instruments(&string_list(raw.get("instrument")), instrument_cap),
            vocals,
            lyric_themes,
            narrative,
            confidence: parse_confidence(
                raw.get("confidence").unwrap_or(&Value::Null),
                default_confidence,
            ),
        }
    }
}

/// Strings from a JSON array, or a lone string. Other shapes yield nothing.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn dedupe(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}
