//! Speech-recognition engine trait and implementations.
//!
//! # Overview
//!
//! [`RecognitionEngine`] is the boundary to the host's speech-to-text
//! capability.  It is object-safe and `Send + Sync` so a single engine can
//! be shared behind an `Arc<dyn RecognitionEngine>` between the interim and
//! final recognition passes.
//!
//! [`WhisperRecognizer`] is the production implementation wrapping a
//! `whisper_rs::WhisperContext`.  Construct it with
//! [`WhisperRecognizer::load`].
//!
//! [`MockRecognizer`] (under `#[cfg(test)]`) replays a script of transcripts
//! so controller tests run without a model file.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

// ---------------------------------------------------------------------------
// RecognizeError
// ---------------------------------------------------------------------------

/// All errors that can arise from the recognition subsystem.
#[derive(Debug, Clone, Error)]
pub enum RecognizeError {
    /// The GGML model file was not found at the given path.
    #[error("recognition model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a context or per-call state.
    #[error("recognition engine initialisation failed: {0}")]
    EngineInit(String),

    /// An error occurred during the inference pass.
    #[error("recognition failed: {0}")]
    Recognition(String),

    /// The audio buffer is shorter than the 0.2 s minimum the engine needs.
    #[error("audio too short for recognition (minimum 0.2 s)")]
    AudioTooShort,
}

// ---------------------------------------------------------------------------
// RecognitionEngine trait
// ---------------------------------------------------------------------------

/// Minimum usable input: 0.2 s at 16 kHz.
pub(crate) const MIN_AUDIO_SAMPLES: usize = 3_200;

/// Object-safe, thread-safe interface for speech-to-text engines.
///
/// # Contract
///
/// - `audio` must be **16 kHz, mono, f32** PCM samples.
/// - Returns `Err(RecognizeError::AudioTooShort)` below
///   [`MIN_AUDIO_SAMPLES`]; callers treat this as "nothing to recognize
///   yet", not a failure.
/// - An `Ok` transcript may be empty — that is the engine's no-match result
///   and is a normal outcome, not an error.
pub trait RecognitionEngine: Send + Sync {
    /// Transcribe `audio` and return the (possibly empty) transcript.
    fn recognize(&self, audio: &[f32]) -> Result<String, RecognizeError>;
}

// Compile-time assertion: Box<dyn RecognitionEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RecognitionEngine>) {}
};

// ---------------------------------------------------------------------------
// WhisperRecognizer
// ---------------------------------------------------------------------------

/// Production recognizer wrapping a `whisper_rs::WhisperContext`.
///
/// A fresh `WhisperState` is created per call so the recognizer can serve
/// interim and final passes from different threads without locking.
pub struct WhisperRecognizer {
    ctx: WhisperContext,
    /// ISO-639-1 language hint, or `"auto"` for engine detection.
    language: String,
    n_threads: i32,
}

impl std::fmt::Debug for WhisperRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperRecognizer")
            .field("language", &self.language)
            .field("n_threads", &self.n_threads)
            .finish_non_exhaustive()
    }
}

// WhisperContext holds a raw pointer internally but whisper-rs declares it
// Send + Sync — the weights are read-only after load.
// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs.
unsafe impl Send for WhisperRecognizer {}
unsafe impl Sync for WhisperRecognizer {}

impl WhisperRecognizer {
    /// Load a GGML model from `model_path`.
    ///
    /// # Errors
    ///
    /// - [`RecognizeError::ModelNotFound`] — `model_path` does not exist.
    /// - [`RecognizeError::EngineInit`] — whisper-rs rejected the file.
    pub fn load(
        model_path: impl AsRef<Path>,
        language: impl Into<String>,
    ) -> Result<Self, RecognizeError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(RecognizeError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            RecognizeError::ModelNotFound(format!(
                "model path is not valid UTF-8: {}",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| RecognizeError::EngineInit(e.to_string()))?;

        Ok(Self {
            ctx,
            language: language.into(),
            n_threads: optimal_threads(),
        })
    }
}

impl RecognitionEngine for WhisperRecognizer {
    fn recognize(&self, audio: &[f32]) -> Result<String, RecognizeError> {
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(RecognizeError::AudioTooShort);
        }

        // Greedy single-pass decoding — the interim passes re-run often, so
        // latency matters more than beam-search accuracy here.
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        let lang: Option<&str> = if self.language == "auto" {
            None
        } else {
            Some(self.language.as_str())
        };
        params.set_language(lang);
        params.set_n_threads(self.n_threads);
        params.set_print_progress(false);
        params.set_print_realtime(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| RecognizeError::EngineInit(e.to_string()))?;

        state
            .full(params, audio)
            .map_err(|e| RecognizeError::Recognition(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| RecognizeError::Recognition(e.to_string()))?;

        let mut text = String::new();
        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| RecognizeError::Recognition(format!("segment {i}: {e}")))?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}

/// CPU threads handed to whisper, capped at 8 where extra cores stop helping.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// UnavailableRecognizer
// ---------------------------------------------------------------------------

/// Stand-in engine used when no model file is present, so the application
/// still starts and reports a useful error on the first attempt instead of
/// failing at construction time.
pub struct UnavailableRecognizer {
    reason: String,
}

impl UnavailableRecognizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RecognitionEngine for UnavailableRecognizer {
    fn recognize(&self, _audio: &[f32]) -> Result<String, RecognizeError> {
        Err(RecognizeError::ModelNotFound(self.reason.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockRecognizer  (test-only)
// ---------------------------------------------------------------------------

/// A test double replaying a script of transcripts.
///
/// Each `recognize` call pops the next scripted response; once the script is
/// exhausted the last response repeats.  Length contracts are enforced so
/// callers are tested against them.
#[cfg(test)]
pub struct MockRecognizer {
    script: std::sync::Mutex<std::collections::VecDeque<Result<String, RecognizeError>>>,
    fallback: Result<String, RecognizeError>,
    /// Number of `recognize` calls made, for assertions.
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockRecognizer {
    /// Always return `Ok(text)`.
    pub fn ok(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::script(vec![Ok(text)])
    }

    /// Always return `Err(error)`.
    pub fn err(error: RecognizeError) -> Self {
        Self::script(vec![Err(error)])
    }

    /// Replay `responses` in order, repeating the last one afterwards.
    pub fn script(responses: Vec<Result<String, RecognizeError>>) -> Self {
        assert!(!responses.is_empty(), "script must not be empty");
        let fallback = responses.last().cloned().unwrap();
        Self {
            script: std::sync::Mutex::new(responses.into()),
            fallback,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[cfg(test)]
impl RecognitionEngine for MockRecognizer {
    fn recognize(&self, audio: &[f32]) -> Result<String, RecognizeError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(RecognizeError::AudioTooShort);
        }

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or_else(|| self.fallback.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn usable_audio() -> Vec<f32> {
        vec![0.0; MIN_AUDIO_SAMPLES]
    }

    // ---- MockRecognizer ----------------------------------------------------

    #[test]
    fn mock_replays_script_then_repeats_last() {
        let engine = MockRecognizer::script(vec![Ok("app".into()), Ok("apple".into())]);
        let audio = usable_audio();
        assert_eq!(engine.recognize(&audio).unwrap(), "app");
        assert_eq!(engine.recognize(&audio).unwrap(), "apple");
        assert_eq!(engine.recognize(&audio).unwrap(), "apple");
        assert_eq!(engine.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn mock_enforces_minimum_length() {
        let engine = MockRecognizer::ok("apple");
        let short = vec![0.0; MIN_AUDIO_SAMPLES - 1];
        assert!(matches!(
            engine.recognize(&short).unwrap_err(),
            RecognizeError::AudioTooShort
        ));
    }

    #[test]
    fn mock_err_propagates() {
        let engine = MockRecognizer::err(RecognizeError::Recognition("boom".into()));
        assert!(matches!(
            engine.recognize(&usable_audio()).unwrap_err(),
            RecognizeError::Recognition(_)
        ));
    }

    #[test]
    fn empty_transcript_is_a_normal_result() {
        let engine = MockRecognizer::ok("");
        assert_eq!(engine.recognize(&usable_audio()).unwrap(), "");
    }

    // ---- WhisperRecognizer::load -------------------------------------------

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperRecognizer::load("/nonexistent/model.bin", "en");
        assert!(
            matches!(result, Err(RecognizeError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    // ---- UnavailableRecognizer ---------------------------------------------

    #[test]
    fn unavailable_recognizer_always_errors() {
        let engine = UnavailableRecognizer::new("model missing: run setup first");
        let err = engine.recognize(&usable_audio()).unwrap_err();
        assert!(err.to_string().contains("model missing"));
    }

    // ---- object safety -----------------------------------------------------

    #[test]
    fn box_dyn_engine_compiles() {
        let engine: Box<dyn RecognitionEngine> = Box::new(MockRecognizer::ok("ok"));
        let _ = engine.recognize(&usable_audio());
    }

    // ---- optimal_threads ---------------------------------------------------

    #[test]
    fn optimal_threads_is_positive_and_at_most_8() {
        let t = optimal_threads();
        assert!((1..=8).contains(&t));
    }
}
