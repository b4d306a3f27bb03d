/// Tempo bands scanned in order, (min, max) BPM.
pub const TEMPO_BANDS: [(f64, f64); 3] = [(80.0, 120.0), (120.0, 160.0), (160.0, 200.0)];

/// Tempos inside this range get a light score bonus.
const COMMON_RANGE: (f64, f64) = (80.0, 160.0);
const COMMON_BONUS: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoCandidate {
    pub bpm: f64,
    pub score: f64,
}

/// Mean-normalized autocorrelation of the envelope.
///
/// `result[lag]` is defined for `1 <= lag <= N-2`; index 0 and N-1 stay zero.
pub fn autocorrelate(envelope: &[f64]) -> Vec<f64> {
    let n = envelope.len();
    let mut autocorr = vec![0.0; n];

    for lag in 1..n.saturating_sub(1) {
        let sum: f64 = envelope[..n - lag]
            .iter()
            .zip(&envelope[lag..])
            .map(|(a, b)| a * b)
            .sum();
        autocorr[lag] = sum / (n - lag) as f64;
    }

    autocorr
}

/// Best-scoring beat period across all tempo bands.
///
/// Bands are scanned in order with ascending lags; on equal scores the first
/// candidate wins. `None` when no lag of any band fits the autocorrelation.
pub fn score_tempo(autocorr: &[f64], hop_rate: f64) -> Option<TempoCandidate> {
    let mut best: Option<TempoCandidate> = None;

    for &(min_bpm, max_bpm) in &TEMPO_BANDS {
        let min_lag = (hop_rate * 60.0 / max_bpm).floor() as usize;
        let max_lag = (hop_rate * 60.0 / min_bpm).floor() as usize;

        for lag in min_lag..=max_lag {
            if lag == 0 || lag >= autocorr.len() {
                break;
            }
            let bpm = 60.0 * hop_rate / lag as f64;
            let bonus = if bpm >= COMMON_RANGE.0 && bpm <= COMMON_RANGE.1 {
                COMMON_BONUS
            } else {
                1.0
            };
            let score = autocorr[lag] * bonus;

            if best.map_or(true, |b| score > b.score) {
                best = Some(TempoCandidate { bpm, score });
            }
        }
    }

    best
}
