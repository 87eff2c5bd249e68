//! Energy-based utterance endpointing for continuous listening.
//!
//! [`UtteranceDetector`] consumes the live 16 kHz mono stream in 30 ms frames
//! and answers two questions for the input controller:
//!
//! * has the learner started speaking yet, and
//! * how much uninterrupted silence has followed the last voiced frame.
//!
//! In continuous mode the controller finalizes an utterance once the trailing
//! silence passes the configured endpoint duration, then resets the detector
//! and waits for the next utterance.
//!
//! [`trim_silence`] removes leading/trailing quiet from a finished clip
//! before recognition — quiet padding slows the engine down and invites
//! hallucinated words.

/// Samples per analysis frame: 30 ms at 16 kHz.
const FRAME_SAMPLES: usize = 480;

/// Milliseconds represented by one full analysis frame.
const FRAME_MS: u32 = 30;

// ---------------------------------------------------------------------------
// UtteranceDetector
// ---------------------------------------------------------------------------

/// Streaming voice/silence tracker.
///
/// # Example
///
/// ```rust
/// use speak_score::audio::UtteranceDetector;
///
/// let mut det = UtteranceDetector::new(0.01);
///
/// det.feed(&vec![0.5_f32; 480]);   // 30 ms of voice
/// assert!(det.voice_heard());
/// assert_eq!(det.trailing_silence_ms(), 0);
///
/// det.feed(&vec![0.0_f32; 960]);   // 60 ms of silence
/// assert_eq!(det.trailing_silence_ms(), 60);
/// ```
#[derive(Debug, Clone)]
pub struct UtteranceDetector {
    /// RMS amplitude below which a frame counts as silence.
    rms_threshold: f32,
    /// Carry-over samples that did not fill a whole frame yet.
    pending: Vec<f32>,
    /// Whether any voiced frame has been seen since the last reset.
    voice_heard: bool,
    /// Silent frames counted since the last voiced frame.
    trailing_silence_frames: u32,
}

impl UtteranceDetector {
    /// Create a detector with the given RMS threshold.
    ///
    /// `0.01` suits a quiet room; raise towards `0.03`–`0.05` for noisy
    /// environments.
    pub fn new(rms_threshold: f32) -> Self {
        Self {
            rms_threshold,
            pending: Vec::with_capacity(FRAME_SAMPLES),
            voice_heard: false,
            trailing_silence_frames: 0,
        }
    }

    /// Feed the next run of 16 kHz mono samples.
    pub fn feed(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);

        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            if rms(&frame) > self.rms_threshold {
                self.voice_heard = true;
                self.trailing_silence_frames = 0;
            } else {
                self.trailing_silence_frames += 1;
            }
        }
    }

    /// `true` once any voiced frame has been observed since the last reset.
    pub fn voice_heard(&self) -> bool {
        self.voice_heard
    }

    /// Uninterrupted silence since the last voiced frame, in milliseconds.
    ///
    /// Counts from the start of the stream too, so callers must pair it with
    /// [`voice_heard`](Self::voice_heard) to avoid endpointing before the
    /// learner has said anything.
    pub fn trailing_silence_ms(&self) -> u32 {
        self.trailing_silence_frames * FRAME_MS
    }

    /// `true` when an utterance has been heard and at least `endpoint_ms` of
    /// silence has followed it.
    pub fn utterance_complete(&self, endpoint_ms: u32) -> bool {
        self.voice_heard && self.trailing_silence_ms() >= endpoint_ms
    }

    /// Forget everything and wait for the next utterance.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.voice_heard = false;
        self.trailing_silence_frames = 0;
    }
}

// ---------------------------------------------------------------------------
// trim_silence
// ---------------------------------------------------------------------------

/// Strip leading and trailing sub-threshold frames from a finished clip.
///
/// Returns a sub-slice of the input; an entirely silent clip trims to an
/// empty slice, which the recognizer reports as a normal no-match.
pub fn trim_silence(audio: &[f32], rms_threshold: f32) -> &[f32] {
    let frames = audio.chunks(FRAME_SAMPLES);
    let total = frames.len();

    let first_voiced = (0..total).find(|&i| frame_is_voiced(audio, i, rms_threshold));
    let Some(first) = first_voiced else {
        return &audio[0..0];
    };

    let last = (first..total)
        .rev()
        .find(|&i| frame_is_voiced(audio, i, rms_threshold))
        .unwrap_or(first);

    let start = first * FRAME_SAMPLES;
    let end = ((last + 1) * FRAME_SAMPLES).min(audio.len());
    &audio[start..end]
}

fn frame_is_voiced(audio: &[f32], frame_index: usize, threshold: f32) -> bool {
    let start = frame_index * FRAME_SAMPLES;
    let end = (start + FRAME_SAMPLES).min(audio.len());
    start < end && rms(&audio[start..end]) > threshold
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_sq.sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
