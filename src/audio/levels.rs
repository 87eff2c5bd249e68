//! Audio level frames for the visualization bars.
//!
//! [`LevelSampler`] condenses an analyser-style magnitude buffer (one byte
//! per band, `0–255`) into a fixed number of normalized bins.  The speech
//! controllers run it on a fixed tick while audio is active and emit the
//! resulting [`LevelFrame`]s; on deactivation the tick source is cancelled
//! first and a final all-zero frame is emitted so the visualization always
//! returns to rest instead of freezing on a stale frame.
//!
//! # Example
//!
//! ```rust
//! use speak_score::audio::LevelSampler;
//!
//! let sampler = LevelSampler::new(20);
//! let buffer = vec![128u8; 512];
//!
//! let frame = sampler.sample(&buffer);
//! assert_eq!(frame.len(), 20);
//! for &v in &frame.bins {
//!     assert!((0.0..=1.0).contains(&v));
//! }
//! ```

// ---------------------------------------------------------------------------
// LevelFrame
// ---------------------------------------------------------------------------

/// One snapshot of normalized amplitude values, ordered low band → high band.
///
/// Regenerated on every sampling tick while audio is active; holds no history
/// and is never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelFrame {
    /// Normalized bin values in `[0.0, 1.0]`.
    pub bins: Vec<f32>,
}

impl LevelFrame {
    /// All-zero frame of the given width — the rest state.
    pub fn zeros(bins: usize) -> Self {
        Self {
            bins: vec![0.0; bins],
        }
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// Returns `true` when the frame has no bins at all.
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Returns `true` when every bin is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.bins.iter().all(|&v| v == 0.0)
    }

    /// Largest bin value in the frame.
    pub fn peak(&self) -> f32 {
        self.bins.iter().cloned().fold(0.0_f32, f32::max)
    }
}

// ---------------------------------------------------------------------------
// LevelSampler
// ---------------------------------------------------------------------------

/// Default number of bins — matches the 20-column visualization bar.
pub const DEFAULT_BINS: usize = 20;

/// Default sampling period while audio is active.
pub const DEFAULT_INTERVAL_MS: u64 = 50;

/// Reduces a magnitude buffer into `bins` normalized values.
///
/// The buffer is split into `bins` contiguous equal-size chunks of
/// `buffer.len() / bins` bytes each; whatever does not divide evenly is
/// dropped off the end (documented edge case, not an error).  Each bin is the
/// arithmetic mean of its chunk's byte magnitudes, normalized by 255.
#[derive(Debug, Clone, Copy)]
pub struct LevelSampler {
    bins: usize,
}

impl LevelSampler {
    /// Create a sampler producing `bins` values per frame.
    ///
    /// `bins` must be non-zero.
    pub fn new(bins: usize) -> Self {
        assert!(bins > 0, "bins must be > 0");
        Self { bins }
    }

    /// Configured frame width.
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Condense `magnitudes` into one frame.
    ///
    /// A buffer shorter than the bin count cannot fill a single chunk, so it
    /// yields the rest frame — the same output as [`LevelSampler::reset`].
    pub fn sample(&self, magnitudes: &[u8]) -> LevelFrame {
        let chunk = magnitudes.len() / self.bins;
        if chunk == 0 {
            return self.reset();
        }

        let bins = magnitudes
            .chunks_exact(chunk)
            .take(self.bins)
            .map(|c| {
                let sum: u32 = c.iter().map(|&m| m as u32).sum();
                sum as f32 / c.len() as f32 / 255.0
            })
            .collect();

        LevelFrame { bins }
    }

    /// The rest frame: all zeros, full width.
    pub fn reset(&self) -> LevelFrame {
        LevelFrame::zeros(self.bins)
    }
}

impl Default for LevelSampler {
    fn default() -> Self {
        Self::new(DEFAULT_BINS)
    }
}

// ---------------------------------------------------------------------------
// magnitude_bytes
// ---------------------------------------------------------------------------

/// Convert a window of PCM samples into an analyser-style magnitude buffer.
///
/// Splits `samples` into `len` bands and takes the mean absolute amplitude of
/// each, scaled to `0–255`.  This is the tap the controllers feed into
/// [`LevelSampler::sample`] when a hardware analyser is not available — an
/// amplitude envelope rather than a true spectrum, which is sufficient for
/// the visualization contract.
///
/// Returns all zeros when `samples` is empty or shorter than `len`.
pub fn magnitude_bytes(samples: &[f32], len: usize) -> Vec<u8> {
    if len == 0 {
        return Vec::new();
    }

    let chunk = samples.len() / len;
    if chunk == 0 {
        return vec![0; len];
    }

    samples
        .chunks_exact(chunk)
        .take(len)
        .map(|c| {
            let mean_abs: f32 = c.iter().map(|s| s.abs()).sum::<f32>() / c.len() as f32;
            (mean_abs.min(1.0) * 255.0) as u8
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- LevelSampler::sample ---------------------------------------------

    #[test]
    fn frame_width_always_matches_bin_count() {
        let sampler = LevelSampler::new(20);
        for input_len in [0usize, 1, 19, 20, 21, 256, 1024, 1025] {
            let buf = vec![200u8; input_len];
            assert_eq!(
                sampler.sample(&buf).len(),
                20,
                "wrong width for input length {input_len}"
            );
        }
    }

    #[test]
    fn all_values_in_unit_range() {
        let sampler = LevelSampler::new(10);
        let buf: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let frame = sampler.sample(&buf);
        for &v in &frame.bins {
            assert!((0.0..=1.0).contains(&v), "bin out of range: {v}");
        }
    }

    #[test]
    fn full_scale_input_maps_to_one() {
        let sampler = LevelSampler::new(4);
        let frame = sampler.sample(&[255u8; 64]);
        for &v in &frame.bins {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn silent_input_maps_to_zero() {
        let sampler = LevelSampler::new(4);
        assert!(sampler.sample(&[0u8; 64]).is_silent());
    }

    #[test]
    fn trailing_remainder_is_dropped() {
        // 10 bytes into 4 bins → chunk size 2, bytes 8 and 9 ignored.
        let mut buf = vec![100u8; 8];
        buf.extend([255u8, 255]);

        let sampler = LevelSampler::new(4);
        let frame = sampler.sample(&buf);

        assert_eq!(frame.len(), 4);
        let expected = 100.0 / 255.0;
        for &v in &frame.bins {
            assert!((v - expected).abs() < 1e-6, "remainder leaked into bin: {v}");
        }
    }

    #[test]
    fn buffer_shorter_than_bins_yields_rest_frame() {
        let sampler = LevelSampler::new(20);
        let frame = sampler.sample(&[255u8; 5]);
        assert_eq!(frame.len(), 20);
        assert!(frame.is_silent());
    }

    #[test]
    fn reset_yields_all_zero_full_width() {
        let sampler = LevelSampler::new(20);
        let frame = sampler.reset();
        assert_eq!(frame.len(), 20);
        assert!(frame.is_silent());
    }

    #[test]
    #[should_panic(expected = "bins must be > 0")]
    fn zero_bins_panics() {
        LevelSampler::new(0);
    }

    // ---- LevelFrame --------------------------------------------------------

    #[test]
    fn peak_reflects_largest_bin() {
        let frame = LevelFrame {
            bins: vec![0.1, 0.7, 0.3],
        };
        assert!((frame.peak() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn zeros_constructor() {
        let frame = LevelFrame::zeros(8);
        assert_eq!(frame.len(), 8);
        assert!(frame.is_silent());
        assert!(!frame.is_empty());
    }

    // ---- magnitude_bytes ---------------------------------------------------

    #[test]
    fn magnitudes_have_requested_length() {
        let samples = vec![0.5f32; 800];
        assert_eq!(magnitude_bytes(&samples, 64).len(), 64);
    }

    #[test]
    fn magnitudes_scale_with_amplitude() {
        let quiet = magnitude_bytes(&vec![0.1f32; 128], 8);
        let loud = magnitude_bytes(&vec![0.9f32; 128], 8);
        assert!(quiet[0] < loud[0]);
    }

    #[test]
    fn magnitudes_clamp_out_of_range_samples() {
        let hot = magnitude_bytes(&vec![2.0f32; 128], 8);
        assert!(hot.iter().all(|&m| m == 255));
    }

    #[test]
    fn short_or_empty_windows_yield_zeros() {
        assert!(magnitude_bytes(&[], 16).iter().all(|&m| m == 0));
        assert!(magnitude_bytes(&[0.5], 16).iter().all(|&m| m == 0));
    }

    #[test]
    fn sampler_round_trip_with_magnitude_tap() {
        // A realistic tick: 50 ms of 16 kHz audio → magnitude buffer → frame.
        let window: Vec<f32> = (0..800).map(|i| (i as f32 * 0.05).sin() * 0.5).collect();
        let frame = LevelSampler::default().sample(&magnitude_bytes(&window, 256));
        assert_eq!(frame.len(), DEFAULT_BINS);
        assert!(frame.peak() > 0.0);
    }
}
