/// Range resolved tempos must fall in.
const CANDIDATE_RANGE: (f64, f64) = (80.0, 200.0);

/// Many rock tracks sit here; grid scores in this range get a small boost.
const PREFERRED_RANGE: (f64, f64) = (140.0, 170.0);
const PREFERRED_BONUS: f64 = 1.05;

const MAX_BEATS: usize = 32;
const PHASE_STEPS: usize = 8;

/// Resolve half/double-time errors by aligning a beat grid with the envelope.
///
/// Candidates are `{bpm/2, bpm, 2*bpm}` inside [80, 200], deduplicated by
/// rounded value. Each is scored by the strongest of eight phase-shifted grids.
/// Returns the input unchanged when no candidate is viable, `None` only when
/// the input is not a usable tempo.
pub fn resolve_octave(envelope: &[f64], hop_rate: f64, bpm: f64) -> Option<f64> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return None;
    }

    let mut candidates: Vec<f64> = Vec::with_capacity(3);
    for c in [bpm / 2.0, bpm, bpm * 2.0] {
        if c < CANDIDATE_RANGE.0 || c > CANDIDATE_RANGE.1 {
            continue;
        }
        if !candidates.iter().any(|seen| seen.round() == c.round()) {
            candidates.push(c);
        }
    }

    let mut best = bpm;
    let mut best_score = f64::NEG_INFINITY;

    for candidate in candidates {
        let interval = hop_rate * (60.0 / candidate);
        if !interval.is_finite() || interval < 2.0 {
            continue;
        }

        let score = grid_score(envelope, interval) * preference(candidate);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }

    Some(best)
}

/// Strongest phase-aligned sum of envelope values on a beat grid.
fn grid_score(envelope: &[f64], interval: f64) -> f64 {
    let beats = MAX_BEATS.min((envelope.len() as f64 / interval).floor() as usize);

    (0..PHASE_STEPS)
        .map(|step| {
            let phase = interval * step as f64 / PHASE_STEPS as f64;
            (0..beats)
                .filter_map(|k| {
                    let idx = (phase + k as f64 * interval).round() as usize;
                    envelope.get(idx)
                })
                .sum::<f64>()
        })
        .fold(f64::NEG_INFINITY, f64::max)
}

fn preference(candidate: f64) -> f64 {
    if candidate >= PREFERRED_RANGE.0 && candidate <= PREFERRED_RANGE.1 {
        PREFERRED_BONUS
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tempo::envelope::hop_rate;

    fn pulses(len: usize, period: usize) -> Vec<f64> {
        (0..len)
            .map(|i| if i % period == 0 { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn half_time_resolves_to_true_tempo() {
        let env = pulses(512, 16);
        let true_bpm = 60.0 * hop_rate() / 16.0;
        let resolved = resolve_octave(&env, hop_rate(), true_bpm / 2.0).unwrap();
        assert!((resolved - true_bpm).abs() < 1e-9, "got {}", resolved);
    }

    #[test]
    fn out_of_range_input_keeps_in_range_octave() {
        // 300 BPM only has 150 inside the candidate range
        let env = pulses(512, 17);
        let resolved = resolve_octave(&env, hop_rate(), 300.0).unwrap();
        assert_eq!(resolved, 150.0);
    }

    #[test]
    fn no_viable_candidate_returns_input() {
        // 500 BPM: nothing within [80, 200]
        let env = pulses(64, 4);
        assert_eq!(resolve_octave(&env, hop_rate(), 500.0), Some(500.0));
    }

    #[test]
    fn unusable_input() {
        let env = pulses(64, 4);
        assert_eq!(resolve_octave(&env, hop_rate(), 0.0), None);
        assert_eq!(resolve_octave(&env, hop_rate(), f64::NAN), None);
    }

    #[test]
    fn preference_favors_rock_range_on_equal_grids() {
        // flat envelope: every grid sums to its 32 beats
        let env = vec![1.0; 4096];
        assert_eq!(resolve_octave(&env, hop_rate(), 80.0), Some(160.0));
        // 100 vs 200 tie, first candidate kept
        assert_eq!(resolve_octave(&env, hop_rate(), 100.0), Some(100.0));
    }
}
