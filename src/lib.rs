//! speak-score — the pronunciation-practice voice pipeline.
//!
//! This crate is the audio/speech backbone of an English-learning
//! application: it speaks a prompt, captures the learner's attempt through
//! the microphone, recognizes it, and scores the transcript against the
//! target phrase.
//!
//! # Architecture
//!
//! ```text
//!              SessionCommand (mpsc)
//!                      │
//!                      ▼
//!            PracticeSession::run()  ← async tokio task
//!              │                │
//!   SpeechOutput            SpeechInput
//!   (SynthesisEngine        (AudioSource → 16 kHz mono →
//!    → AudioSink,            RecognitionEngine,
//!    level envelope)         endpointing, level frames)
//!              │                │
//!          SynthEvent      ListenEvent
//!              └───────┬────────┘
//!                      ▼
//!          PronunciationScorer → UtteranceComparison
//!                      │
//!              SessionEvent (mpsc) + SharedSession snapshot
//! ```
//!
//! Every hardware or engine boundary is a trait (`SynthesisEngine`,
//! `RecognitionEngine`, `AudioSource`, `AudioSink`) with a production
//! implementation and a deterministic test double, so the whole pipeline is
//! testable without audio hardware.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use speak_score::audio::{MicSource, RodioSink};
//! use speak_score::config::AppConfig;
//! use speak_score::listen::{SpeechInput, WhisperRecognizer};
//! use speak_score::session::{new_shared_session, PracticeSession, SessionCommand};
//! use speak_score::synth::{EspeakEngine, SpeechOutput, VoiceProfile};
//!
//! # async fn example() {
//! let config = AppConfig::default();
//!
//! let (output, synth_rx) = SpeechOutput::new(
//!     Arc::new(EspeakEngine::new()),
//!     Box::new(RodioSink::new()),
//!     VoiceProfile::from(&config.speech),
//!     &config.levels,
//! );
//!
//! let recognizer = WhisperRecognizer::load("models/ggml-base.en.bin", "en").unwrap();
//! let (input, listen_rx) = SpeechInput::new(
//!     Box::new(MicSource::new(None)),
//!     Arc::new(recognizer),
//!     config.listen.clone(),
//!     &config.levels,
//! );
//!
//! let session = new_shared_session(config.levels.bins);
//! let runner = PracticeSession::new(output, synth_rx, input, listen_rx, session);
//!
//! let (command_tx, command_rx) = tokio::sync::mpsc::channel(16);
//! let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(32);
//! tokio::spawn(runner.run(command_rx, event_tx));
//!
//! command_tx
//!     .send(SessionCommand::SpeakPrompt { text: "apple".into() })
//!     .await
//!     .unwrap();
//! while let Some(event) = event_rx.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod listen;
pub mod score;
pub mod session;
pub mod synth;
