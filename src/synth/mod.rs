//! Speech synthesis — engine boundary and output controller.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                SpeechOutput (controller)                │
//! │                                                        │
//! │  speak(text) ──▶ SynthesisEngine::synthesize ──▶ PCM   │
//! │                        │                        │      │
//! │                  select_voice              AudioSink   │
//! │                                                 │      │
//! │  SynthEvent: Started / Levels / Ended / Cancelled /    │
//! │              Error  (tokio mpsc)                       │
//! └────────────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod engine;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use controller::{SpeechOutput, SynthEvent, SynthState};
pub use engine::{
    select_voice, EspeakEngine, SynthError, SynthesisEngine, SynthesizedAudio, VoiceInfo,
    VoiceProfile,
};

// test-only re-export so other modules' tests can use the mock without
// spelling out the full path.
#[cfg(test)]
pub use engine::MockSynthEngine;
