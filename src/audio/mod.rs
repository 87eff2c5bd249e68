//! Audio plumbing — capture, playback, format conversion, levels, endpointing.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → downmix_to_mono
//!           → resample_to_16k → utterance buffer → UtteranceDetector
//!                              └→ magnitude_bytes → LevelSampler → LevelFrame
//!
//! SynthesisEngine PCM → AudioSink (rodio) → output device
//! ```
//!
//! The hardware edges ([`MicSource`], [`RodioSink`]) sit behind the
//! [`AudioSource`] / [`AudioSink`] traits so the speech controllers can be
//! exercised with deterministic fakes.

pub mod capture;
pub mod endpoint;
pub mod io;
pub mod levels;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use endpoint::{trim_silence, UtteranceDetector};
pub use io::{AudioSink, AudioSource, MicSource, PlaybackError, RodioSink};
pub use levels::{magnitude_bytes, LevelFrame, LevelSampler, DEFAULT_BINS, DEFAULT_INTERVAL_MS};
pub use resample::{downmix_to_mono, resample_to_16k, RECOGNIZER_RATE};
