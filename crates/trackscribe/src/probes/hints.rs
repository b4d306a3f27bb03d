//! Label sets, score-to-hint rules and hint merging.

use std::collections::HashMap;

use tracing::debug;

use crate::probes::classifier::LabelScore;
use crate::taxonomy::Taxonomy;
use crate::types::HintMap;

/// Labels scored against each audio window.
pub const CLAP_LABELS: &[&str] = &[
    "brass section",
    "trumpet",
    "trombone",
    "saxophone",
    "violin",
    "cello",
    "double bass",
    "string section",
    "piano",
    "organ",
    "keyboard",
    "accordion",
    "electric guitar",
    "acoustic guitar",
    "bass guitar",
    "banjo",
    "ukulele",
    "drums",
    "drum kit",
    "percussion",
    "flute",
    "clarinet",
    "harmonica",
    "bells",
    "harp",
    "synthesizer",
    "vocals",
];

/// Labels scored against the track title.
pub const ZERO_SHOT_LABELS: &[&str] = &[
    "Brass section",
    "Trumpet",
    "Trombone",
    "Saxophone",
    "Lead Vocals",
    "Male Vocals",
    "Female Vocals",
    "Background Vocals",
    "Electric Guitar",
    "Acoustic Guitar",
    "Piano",
    "Drum Kit",
    "Synth Pad",
    "Synth Lead",
];

/// Each hint fires when the best of its labels reaches the threshold.
const HINT_RULES: &[(&str, &[&str])] = &[
    ("brass", &["brass section", "trumpet", "trombone"]),
    ("trumpet", &["trumpet"]),
    ("trombone", &["trombone"]),
    ("saxophone", &["saxophone"]),
    ("strings", &["violin", "cello", "string section"]),
    ("violin", &["violin"]),
    ("cello", &["cello"]),
    ("piano", &["piano"]),
    ("organ", &["organ"]),
    ("keyboard", &["keyboard"]),
    ("accordion", &["accordion"]),
    ("guitar", &["electric guitar", "acoustic guitar"]),
    ("bass", &["bass guitar", "double bass"]),
    ("banjo", &["banjo"]),
    ("ukulele", &["ukulele"]),
    ("drumkit", &["drums", "drum kit"]),
    ("percussion", &["percussion"]),
    ("flute", &["flute"]),
    ("clarinet", &["clarinet"]),
    ("harmonica", &["harmonica"]),
    ("bells", &["bells"]),
    ("harp", &["harp"]),
    ("synth", &["synthesizer", "synth pad", "synth lead"]),
    (
        "vocals",
        &[
            "vocals",
            "lead vocals",
            "male vocals",
            "female vocals",
            "background vocals",
        ],
    ),
];

/// Labels kept per probe for the record.
const MAX_LABELS_KEPT: usize = 10;

/// Boolean hints from classifier scores. Labels match case-insensitively;
/// a missing label scores zero.
pub fn hints_from_scores(scores: &[LabelScore], threshold: f64) -> HintMap {
    let by_label: HashMap<String, f64> = scores
        .iter()
        .map(|s| (s.label.trim().to_lowercase(), s.score))
        .collect();
    let get = |label: &str| by_label.get(label).copied().unwrap_or(0.0);

    HINT_RULES
        .iter()
        .map(|(hint, labels)| {
            let best = labels.iter().map(|l| get(l)).fold(0.0, f64::max);
            (hint.to_string(), best >= threshold)
        })
        .collect()
}

/// Label names ordered by descending score, at most ten.
pub fn top_labels(scores: &[LabelScore]) -> Vec<String> {
    let mut sorted: Vec<&LabelScore> = scores.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
    sorted
        .into_iter()
        .take(MAX_LABELS_KEPT)
        .map(|s| s.label.clone())
        .collect()
}

/// Per-key logical OR. Once true, a key stays true.
pub fn or_hints(a: &HintMap, b: &HintMap) -> HintMap {
    let mut merged = a.clone();
    for (key, &value) in b {
        let entry = merged.entry(key.clone()).or_insert(false);
        *entry = *entry || value;
    }
    merged
}

/// Append instruments implied by true hints to an instrument list.
///
/// Only adds. Hints without a canonical instrument are ignored; additions
/// still pass the taxonomy dedupe, strings guard and cap.
pub fn rescue_instruments(
    taxonomy: &Taxonomy,
    instruments: &[String],
    hints: &HintMap,
    cap: usize,
) -> Vec<String> {
    let additions: Vec<&str> = HINT_RULES
        .iter()
        .filter(|(hint, _)| hints.get(*hint).copied().unwrap_or(false))
        .filter_map(|(hint, _)| taxonomy.hint_instrument(hint))
        .collect();

    if additions.is_empty() {
        return instruments.to_vec();
    }
    debug!(?additions, "rescuing instruments from probe hints");
    taxonomy.merge_instruments(instruments, &additions, cap)
}
