//! Speech-input controller — the recognition state machine.
//!
//! [`SpeechInput`] owns the microphone claim:
//!
//! ```text
//! Idle ──start()──▶ Listening ──stop() / endpoint (one-shot) / error──▶ Idle
//! ```
//!
//! `start()` is fire-and-forget: a `listen-worker` thread drains the capture
//! channel, converts chunks to 16 kHz mono, and drives three activities —
//!
//! * level frames on a fixed tick from the most recent audio window,
//! * interim recognition passes over the accumulated utterance buffer
//!   (when `interim_results` is enabled),
//! * endpointing: once the learner has spoken and the configured trailing
//!   silence accumulates, the utterance is recognized and emitted as a
//!   `Final` transcript.  In continuous mode the worker keeps listening for
//!   the next utterance; in one-shot mode it releases the microphone and
//!   goes idle on its own.
//!
//! Every exit path — explicit `stop()`, one-shot endpoint, engine error,
//! dead capture stream — closes the audio source before the final signals
//! are sent, so the microphone is never left half-open.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::{
    downmix_to_mono, magnitude_bytes, resample_to_16k, trim_silence, AudioSource, LevelFrame,
    LevelSampler, UtteranceDetector, RECOGNIZER_RATE,
};
use crate::config::{LevelsConfig, ListenConfig};
use crate::listen::engine::{RecognitionEngine, RecognizeError, MIN_AUDIO_SAMPLES};

/// Width of the magnitude buffer fed to the sampler each tick.
const MAGNITUDE_BANDS: usize = 128;

/// Hard cap on one utterance: 60 s at 16 kHz.  Reaching it forces an
/// endpoint as if the learner had gone silent.
const MAX_UTTERANCE_SAMPLES: usize = 960_000;

// ---------------------------------------------------------------------------
// ListenState
// ---------------------------------------------------------------------------

/// Lifecycle of the recognition slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    /// Microphone released, nothing running.
    Idle,
    /// Microphone claimed, audio being processed.
    Listening,
}

// ---------------------------------------------------------------------------
// ListenEvent
// ---------------------------------------------------------------------------

/// Progress signals emitted by [`SpeechInput`].
#[derive(Debug, Clone)]
pub enum ListenEvent {
    /// The microphone was claimed and listening began.
    Started,
    /// Amplitude snapshot of the live input (one per tick).
    Levels(LevelFrame),
    /// A provisional transcript; more audio may still revise it.
    Interim { text: String },
    /// A completed utterance.  An empty `text` is the engine's no-match
    /// result — a normal outcome, not an error.
    Final { text: String },
    /// Something failed; the controller has already released the microphone
    /// and returned to idle.
    Error { message: String },
    /// Listening ended (after `stop()`, a one-shot endpoint, or an error).
    Stopped,
}

// ---------------------------------------------------------------------------
// SpeechInput
// ---------------------------------------------------------------------------

/// Caller-owned speech-recognition controller.
///
/// Holds the process's single claim on the configured input device; calling
/// [`start`](Self::start) while already listening is a no-op so two claims
/// can never race.  [`stop`](Self::stop) blocks until the worker has
/// released the microphone and emitted the final transcript.
pub struct SpeechInput {
    source: Option<Box<dyn AudioSource>>,
    recognizer: Arc<dyn RecognitionEngine>,
    config: ListenConfig,
    sampler: LevelSampler,
    tick: Duration,
    event_tx: mpsc::UnboundedSender<ListenEvent>,
    state: Arc<Mutex<ListenState>>,
    worker: Option<Worker>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<Box<dyn AudioSource>>,
}

impl SpeechInput {
    /// Create a controller and the receiving end of its event stream.
    pub fn new(
        source: Box<dyn AudioSource>,
        recognizer: Arc<dyn RecognitionEngine>,
        config: ListenConfig,
        levels: &LevelsConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ListenEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let controller = Self {
            source: Some(source),
            recognizer,
            config,
            sampler: LevelSampler::new(levels.bins),
            tick: Duration::from_millis(levels.interval_ms),
            event_tx,
            state: Arc::new(Mutex::new(ListenState::Idle)),
            worker: None,
        };
        (controller, event_rx)
    }

    /// Claim the microphone and begin listening.
    ///
    /// A no-op while already listening.  A failed claim (missing device,
    /// denied permission) emits one `Error` event and leaves the controller
    /// idle with nothing held open.
    pub fn start(&mut self) {
        if self.is_listening() {
            log::debug!("start() while listening — ignored");
            return;
        }

        self.reap_worker();

        let Some(mut source) = self.source.take() else {
            let _ = self.event_tx.send(ListenEvent::Error {
                message: "audio source unavailable".into(),
            });
            return;
        };

        let (chunk_tx, chunk_rx) = std_mpsc::channel();
        if let Err(e) = source.open(chunk_tx) {
            log::warn!("microphone claim failed: {e}");
            self.source = Some(source);
            let _ = self.event_tx.send(ListenEvent::Error {
                message: e.to_string(),
            });
            return;
        }

        *self.state.lock().unwrap() = ListenState::Listening;
        let _ = self.event_tx.send(ListenEvent::Started);

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            recognizer: Arc::clone(&self.recognizer),
            config: self.config.clone(),
            sampler: self.sampler,
            tick: self.tick,
            event_tx: self.event_tx.clone(),
            state: Arc::clone(&self.state),
            stop: Arc::clone(&stop),
        };

        match thread::Builder::new()
            .name("listen-worker".into())
            .spawn(move || listen_worker(source, chunk_rx, ctx))
        {
            Ok(thread) => {
                self.worker = Some(Worker { stop, thread });
            }
            Err(e) => {
                // The source moved into the failed spawn closure and is gone;
                // report and stay idle.
                *self.state.lock().unwrap() = ListenState::Idle;
                let _ = self.event_tx.send(ListenEvent::Error {
                    message: format!("could not start listen worker: {e}"),
                });
            }
        }
    }

    /// Stop listening, release the microphone, and emit the final
    /// transcript for whatever was captured.
    ///
    /// Blocks until the worker has torn down (including the final
    /// recognition pass).  A no-op when idle.
    pub fn stop(&mut self) {
        self.reap_worker();
        *self.state.lock().unwrap() = ListenState::Idle;
    }

    /// `true` while the microphone is claimed.
    pub fn is_listening(&self) -> bool {
        *self.state.lock().unwrap() == ListenState::Listening
    }

    /// Current slot state.
    pub fn state(&self) -> ListenState {
        *self.state.lock().unwrap()
    }

    /// Signal the worker to stop and take its audio source back.
    fn reap_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::SeqCst);
            match worker.thread.join() {
                Ok(source) => self.source = Some(source),
                Err(_) => {
                    log::error!("listen worker panicked; audio source lost");
                }
            }
        }
    }
}

impl Drop for SpeechInput {
    fn drop(&mut self) {
        self.reap_worker();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct WorkerContext {
    recognizer: Arc<dyn RecognitionEngine>,
    config: ListenConfig,
    sampler: LevelSampler,
    tick: Duration,
    event_tx: mpsc::UnboundedSender<ListenEvent>,
    state: Arc<Mutex<ListenState>>,
    stop: Arc<AtomicBool>,
}

enum ExitReason {
    /// `stop()` was called — finish the attempt from captured audio.
    StopRequested,
    /// One-shot endpoint: the final transcript was already emitted.
    AutoStop,
    /// The capture stream died underneath us.
    SourceLost,
    /// Recognition failed mid-session.
    Failed(String),
}

/// The listening loop.  Always returns the source so the controller can
/// reuse it for the next session; the source is closed before any terminal
/// event is sent.
fn listen_worker(
    mut source: Box<dyn AudioSource>,
    chunk_rx: std_mpsc::Receiver<crate::audio::AudioChunk>,
    ctx: WorkerContext,
) -> Box<dyn AudioSource> {
    let WorkerContext {
        recognizer,
        config,
        sampler,
        tick,
        event_tx,
        state,
        stop,
    } = ctx;

    let mut utterance: Vec<f32> = Vec::new();
    let mut window: Vec<f32> = Vec::new();
    let window_cap = ((RECOGNIZER_RATE as f64) * tick.as_secs_f64()).max(1.0) as usize;

    let mut detector = UtteranceDetector::new(config.silence_threshold);
    let interim_interval = Duration::from_millis(config.interim_interval_ms);
    let mut last_tick = Instant::now();
    let mut last_interim = Instant::now();
    let mut last_interim_text: Option<String> = None;

    let exit = loop {
        if stop.load(Ordering::SeqCst) {
            break ExitReason::StopRequested;
        }

        match chunk_rx.recv_timeout(Duration::from_millis(10)) {
            Ok(chunk) => {
                let mono = downmix_to_mono(&chunk.samples, chunk.channels);
                let pcm = resample_to_16k(&mono, chunk.sample_rate);

                detector.feed(&pcm);
                utterance.extend_from_slice(&pcm);

                window.extend_from_slice(&pcm);
                if window.len() > window_cap {
                    window.drain(..window.len() - window_cap);
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break ExitReason::SourceLost,
        }

        if last_tick.elapsed() >= tick {
            last_tick = Instant::now();
            let frame = sampler.sample(&magnitude_bytes(&window, MAGNITUDE_BANDS));
            let _ = event_tx.send(ListenEvent::Levels(frame));
        }

        // Endpoint: trailing silence after speech, or the utterance cap.
        if detector.utterance_complete(config.endpoint_silence_ms)
            || utterance.len() > MAX_UTTERANCE_SAMPLES
        {
            let clip = std::mem::take(&mut utterance);
            detector.reset();
            last_interim_text = None;

            match finalize(recognizer.as_ref(), &clip, config.silence_threshold) {
                Ok(text) => {
                    log::debug!("utterance complete: {text:?}");
                    let _ = event_tx.send(ListenEvent::Final { text });
                    if !config.continuous {
                        break ExitReason::AutoStop;
                    }
                }
                Err(e) => break ExitReason::Failed(e.to_string()),
            }
        }

        // Interim pass over the growing utterance buffer.
        if config.interim_results
            && detector.voice_heard()
            && last_interim.elapsed() >= interim_interval
            && utterance.len() >= MIN_AUDIO_SAMPLES
        {
            last_interim = Instant::now();
            match recognizer.recognize(&utterance) {
                Ok(text) => {
                    if !text.is_empty() && last_interim_text.as_deref() != Some(text.as_str()) {
                        last_interim_text = Some(text.clone());
                        let _ = event_tx.send(ListenEvent::Interim { text });
                    }
                }
                Err(RecognizeError::AudioTooShort) => {}
                Err(e) => break ExitReason::Failed(e.to_string()),
            }
        }
    };

    // Mic release comes first on every path.
    source.close();

    match exit {
        ExitReason::StopRequested => {
            let _ = event_tx.send(ListenEvent::Levels(sampler.reset()));
            match finalize(recognizer.as_ref(), &utterance, config.silence_threshold) {
                Ok(text) => {
                    let _ = event_tx.send(ListenEvent::Final { text });
                }
                Err(e) => {
                    let _ = event_tx.send(ListenEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            let _ = event_tx.send(ListenEvent::Stopped);
        }
        ExitReason::AutoStop => {
            let _ = event_tx.send(ListenEvent::Levels(sampler.reset()));
            let _ = event_tx.send(ListenEvent::Stopped);
        }
        ExitReason::SourceLost => {
            let _ = event_tx.send(ListenEvent::Levels(sampler.reset()));
            let _ = event_tx.send(ListenEvent::Error {
                message: "microphone stream ended unexpectedly".into(),
            });
            let _ = event_tx.send(ListenEvent::Stopped);
        }
        ExitReason::Failed(message) => {
            log::warn!("recognition failed mid-session: {message}");
            let _ = event_tx.send(ListenEvent::Levels(sampler.reset()));
            let _ = event_tx.send(ListenEvent::Error { message });
            let _ = event_tx.send(ListenEvent::Stopped);
        }
    }

    *state.lock().unwrap() = ListenState::Idle;
    source
}

/// Trim silence and recognize a finished clip.
///
/// Clips with no usable speech left after trimming become the empty
/// transcript — the no-match result.
fn finalize(
    recognizer: &dyn RecognitionEngine,
    clip: &[f32],
    silence_threshold: f32,
) -> Result<String, RecognizeError> {
    let trimmed = trim_silence(clip, silence_threshold);
    if trimmed.len() < MIN_AUDIO_SAMPLES {
        return Ok(String::new());
    }
    match recognizer.recognize(trimmed) {
        Err(RecognizeError::AudioTooShort) => Ok(String::new()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
