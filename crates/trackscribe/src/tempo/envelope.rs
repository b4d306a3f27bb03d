/// Sample rate the tempo window is decoded at.
pub const SAMPLE_RATE: u32 = 11_025;
pub const FRAME_SIZE: usize = 512;
pub const HOP_SIZE: usize = 256;

/// Fewest envelope frames that still yield a tempo.
pub const MIN_FRAMES: usize = 4;

/// Envelope frames per second.
pub fn hop_rate() -> f64 {
    SAMPLE_RATE as f64 / HOP_SIZE as f64
}

/// Convert little-endian signed 16-bit PCM to floats in [-1, 1).
pub fn samples_from_s16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Energy-flux onset envelope: per hop, the positive increase of frame
/// energy over the previous frame.
///
/// Returns `None` when fewer than [`MIN_FRAMES`] frames fit.
pub fn onset_envelope(samples: &[f32]) -> Option<Vec<f64>> {
    let mut envelope = Vec::with_capacity(samples.len() / HOP_SIZE);
    let mut prev_energy = 0.0f64;

    let mut i = 0;
    while i + FRAME_SIZE < samples.len() {
        let energy: f64 = samples[i..i + FRAME_SIZE]
            .iter()
            .map(|&s| {
                let v = s as f64;
                v * v
            })
            .sum();
        envelope.push((energy - prev_energy).max(0.0));
        prev_energy = energy;
        i += HOP_SIZE;
    }

    if envelope.len() < MIN_FRAMES {
        return None;
    }
    Some(envelope)
}
