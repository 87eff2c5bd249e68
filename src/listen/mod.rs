//! Speech recognition — engine boundary and input controller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 SpeechInput (controller)                  │
//! │                                                          │
//! │  start() ──▶ AudioSource (mic) ──▶ 16 kHz mono buffer    │
//! │                    │                     │               │
//! │              LevelSampler        RecognitionEngine       │
//! │                    │              (interim + final)      │
//! │                                                          │
//! │  ListenEvent: Started / Levels / Interim / Final /       │
//! │               Error / Stopped  (tokio mpsc)              │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod engine;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use controller::{ListenEvent, ListenState, SpeechInput};
pub use engine::{RecognitionEngine, RecognizeError, UnavailableRecognizer, WhisperRecognizer};

// test-only re-export so other modules' tests can use the mock without
// spelling out the full path.
#[cfg(test)]
pub use engine::MockRecognizer;
