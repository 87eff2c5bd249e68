//! Channel downmix and resampling to the recognizer's input format.
//!
//! The recognition engine consumes **16 kHz mono `f32`** PCM.  Captured audio
//! arrives at whatever rate and channel count the device prefers, so every
//! chunk passes through [`downmix_to_mono`] and [`resample_to_16k`] before it
//! reaches the utterance buffer.

/// Target rate for the recognition engine.
pub const RECOGNIZER_RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Average interleaved channels down to a single mono channel.
///
/// Output length is `samples.len() / channels`.  Mono input is returned as an
/// owned copy without touching the values; zero channels yields an empty
/// vector.
///
/// # Example
///
/// ```rust
/// use speak_score::audio::downmix_to_mono;
///
/// let stereo = [0.8_f32, 0.2, -0.4, -0.6]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.5).abs() < 1e-6);
/// assert!((mono[1] + 0.5).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_to_16k
// ---------------------------------------------------------------------------

/// Linear-interpolation resample from `source_rate` Hz to 16 000 Hz.
///
/// Already-16 kHz input is copied through unchanged.  Output length is
/// `ceil(samples.len() * 16_000 / source_rate)`.
///
/// # Example
///
/// ```rust
/// use speak_score::audio::resample_to_16k;
///
/// let chunk_48k = vec![0.25_f32; 480]; // 10 ms at 48 kHz
/// let out = resample_to_16k(&chunk_48k, 48_000);
/// assert_eq!(out.len(), 160);          // 10 ms at 16 kHz
/// ```
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Vec<f32> {
    if source_rate == RECOGNIZER_RATE || samples.is_empty() {
        return samples.to_vec();
    }

    let step = source_rate as f64 / RECOGNIZER_RATE as f64;
    let output_len = (samples.len() as f64 / step).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;

            match (samples.get(idx), samples.get(idx + 1)) {
                (Some(&s0), Some(&s1)) => s0 + (s1 - s0) * frac,
                (Some(&s0), None) => s0,
                _ => 0.0,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
