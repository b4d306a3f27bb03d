/// Tempos musicians commonly notate fall in this range.
const COMMON_RANGE: (f64, f64) = (70.0, 180.0);
const IN_RANGE_BONUS: f64 = 100.0;
const CENTER_BPM: f64 = 120.0;

/// Final bias pass toward common tempos, rounded to a whole BPM.
///
/// Picks among `{bpm, bpm/2, 2*bpm}` the candidate scoring highest on
/// `100 (if in [70, 180]) - |candidate - 120|`; the first wins ties.
pub fn normalize_bpm(bpm: f64) -> Option<u32> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }

    let mut best = bpm;
    let mut best_score = f64::NEG_INFINITY;
    for candidate in [bpm, bpm * 0.5, bpm * 2.0] {
        let score = score(candidate);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }

    // a positive tempo never rounds down to zero
    Some((best.round() as u32).max(1))
}

fn score(candidate: f64) -> f64 {
    let bonus = if candidate >= COMMON_RANGE.0 && candidate <= COMMON_RANGE.1 {
        IN_RANGE_BONUS
    } else {
        0.0
    };
    bonus - (candidate - CENTER_BPM).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_tempos_pass_through() {
        assert_eq!(normalize_bpm(120.0), Some(120));
        assert_eq!(normalize_bpm(95.4), Some(95));
        assert_eq!(normalize_bpm(128.6), Some(129));
    }

    #[test]
    fn octave_outliers_fold_toward_center() {
        assert_eq!(normalize_bpm(240.0), Some(120));
        assert_eq!(normalize_bpm(60.0), Some(120));
        assert_eq!(normalize_bpm(350.0), Some(175));
    }

    #[test]
    fn high_in_range_tempo_can_still_halve() {
        // 175 scores 45, 87.5 scores 67.5
        assert_eq!(normalize_bpm(175.0), Some(88));
    }

    #[test]
    fn always_positive_integer() {
        for bpm in [0.01, 0.2, 1.0, 33.3, 1000.0, 1e9] {
            let out = normalize_bpm(bpm).unwrap();
            assert!(out >= 1, "{} -> {}", bpm, out);
        }
    }

    #[test]
    fn rejects_unusable_input() {
        assert_eq!(normalize_bpm(0.0), None);
        assert_eq!(normalize_bpm(-120.0), None);
        assert_eq!(normalize_bpm(f64::INFINITY), None);
        assert_eq!(normalize_bpm(f64::NAN), None);
    }
}
