//! Speech-output controller — the synthesis state machine.
//!
//! [`SpeechOutput`] owns one logical utterance slot:
//!
//! ```text
//! Idle ──speak()──▶ Speaking ──pause()──▶ Paused
//!   ▲                  │  ▲                 │
//!   │                  │  └────resume()─────┘
//!   └──stop() / clip drained / engine error──┘
//! ```
//!
//! `speak()` is fire-and-forget: synthesis and playback run on a worker
//! thread and progress is reported through [`SynthEvent`]s.  Starting a new
//! utterance cancels the one in flight first, so at most one utterance is
//! ever audible — the old utterance gets exactly one `Cancelled`, the new
//! one exactly one `Started`.
//!
//! While speaking, the controller emits a [`LevelFrame`] per tick computed
//! from the synthesized waveform at the playback position; on every terminal
//! transition the worker is invalidated *before* the final zero frame is
//! sent, so a stale frame can never land after the reset.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::{magnitude_bytes, AudioSink, LevelFrame, LevelSampler};
use crate::config::LevelsConfig;
use crate::synth::engine::{select_voice, SynthesisEngine, VoiceProfile};

/// Width of the magnitude buffer fed to the sampler each tick.
const MAGNITUDE_BANDS: usize = 128;

// ---------------------------------------------------------------------------
// SynthState
// ---------------------------------------------------------------------------

/// Lifecycle of the synthesis slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthState {
    /// Nothing queued or audible.
    Idle,
    /// An utterance is playing.
    Speaking,
    /// The current utterance is suspended mid-clip.
    Paused,
}

// ---------------------------------------------------------------------------
// SynthEvent
// ---------------------------------------------------------------------------

/// Progress signals emitted by [`SpeechOutput`].
///
/// For every utterance, `Started` precedes at most one terminal signal
/// (`Ended`, `Cancelled` or `Error`); a final all-zero `Levels` frame is
/// emitted before each terminal signal.
#[derive(Debug, Clone)]
pub enum SynthEvent {
    /// Playback of the utterance began.
    Started,
    /// Amplitude snapshot of the playback position (one per tick).
    Levels(LevelFrame),
    /// The utterance played to completion.
    Ended,
    /// The utterance was cut short by `stop()` or a newer `speak()`.
    Cancelled,
    /// Synthesis or playback failed; the controller is idle again.
    Error { message: String },
}

// ---------------------------------------------------------------------------
// SpeechOutput
// ---------------------------------------------------------------------------

/// Caller-owned speech-synthesis controller.
///
/// Construct with an engine and a sink; events arrive on the returned
/// receiver.  All methods are non-blocking apart from brief sink locking.
pub struct SpeechOutput {
    engine: Arc<dyn SynthesisEngine>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    profile: VoiceProfile,
    sampler: LevelSampler,
    tick: Duration,
    event_tx: mpsc::UnboundedSender<SynthEvent>,
    state: Arc<Mutex<SynthState>>,
    /// Id of the utterance currently owning the slot; `0` means none.
    /// Workers compare against their own id before every emission, so
    /// bumping this atomically revokes a worker's right to speak.
    current: Arc<AtomicU64>,
    /// Monotonic id source (ids start at 1; 0 is reserved for "none").
    next_id: u64,
}

impl SpeechOutput {
    /// Create a controller and the receiving end of its event stream.
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        sink: Box<dyn AudioSink>,
        profile: VoiceProfile,
        levels: &LevelsConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SynthEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let controller = Self {
            engine,
            sink: Arc::new(Mutex::new(sink)),
            profile,
            sampler: LevelSampler::new(levels.bins),
            tick: Duration::from_millis(levels.interval_ms),
            event_tx,
            state: Arc::new(Mutex::new(SynthState::Idle)),
            current: Arc::new(AtomicU64::new(0)),
            next_id: 0,
        };
        (controller, event_rx)
    }

    /// Speak `text`, cancelling any utterance already in flight.
    ///
    /// Returns immediately; outcomes arrive as [`SynthEvent`]s.  When the
    /// synthesis engine is unavailable an `Error` event is emitted and the
    /// controller stays idle — retrying is the caller's decision.
    pub fn speak(&mut self, text: impl Into<String>) {
        self.stop();

        self.next_id += 1;
        let id = self.next_id;
        self.current.store(id, Ordering::SeqCst);

        let text = text.into();
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.current);
        let event_tx = self.event_tx.clone();
        let profile = self.profile.clone();
        let sampler = self.sampler;
        let tick = self.tick;

        let spawned = thread::Builder::new().name("speech-synth".into()).spawn(move || {
            speak_worker(
                id, text, engine, sink, state, current, event_tx, profile, sampler, tick,
            )
        });

        if let Err(e) = spawned {
            self.current.store(0, Ordering::SeqCst);
            let _ = self.event_tx.send(SynthEvent::Error {
                message: format!("could not start synthesis worker: {e}"),
            });
        }
    }

    /// Cancel the current utterance immediately.
    ///
    /// No-op when idle.  When an audible utterance is cut off, a final zero
    /// frame and one `Cancelled` are emitted.
    pub fn stop(&mut self) {
        // The swap and the reset signals happen under the state lock, and
        // the worker emits its per-tick frame under the same lock after
        // re-checking ownership — so no stale frame can be queued after the
        // zero frame below.
        let prior = {
            let mut st = self.state.lock().unwrap();
            let prior = self.current.swap(0, Ordering::SeqCst);
            let audible = *st != SynthState::Idle;
            *st = SynthState::Idle;

            if audible {
                let _ = self.event_tx.send(SynthEvent::Levels(self.sampler.reset()));
                let _ = self.event_tx.send(SynthEvent::Cancelled);
            }
            prior
        };

        if prior != 0 {
            self.sink.lock().unwrap().stop();
        }
    }

    /// Suspend playback.  Only valid while `Speaking`; otherwise a no-op.
    pub fn pause(&mut self) {
        let mut st = self.state.lock().unwrap();
        if *st == SynthState::Speaking {
            *st = SynthState::Paused;
            drop(st);
            self.sink.lock().unwrap().pause();
        }
    }

    /// Continue a paused utterance.  Only valid while `Paused`; otherwise a
    /// no-op.
    pub fn resume(&mut self) {
        let mut st = self.state.lock().unwrap();
        if *st == SynthState::Paused {
            *st = SynthState::Speaking;
            drop(st);
            self.sink.lock().unwrap().resume();
        }
    }

    /// `true` while an utterance is playing (not paused, not idle).
    pub fn is_speaking(&self) -> bool {
        *self.state.lock().unwrap() == SynthState::Speaking
    }

    /// Current slot state.
    pub fn state(&self) -> SynthState {
        *self.state.lock().unwrap()
    }
}

impl Drop for SpeechOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Synthesis + playback + level emission for one utterance.
///
/// Every emission is guarded by `current == id`; `stop()` and a newer
/// `speak()` revoke the guard, after which this worker exits silently and
/// the revoker owns the terminal signals.
#[allow(clippy::too_many_arguments)]
fn speak_worker(
    id: u64,
    text: String,
    engine: Arc<dyn SynthesisEngine>,
    sink: Arc<Mutex<Box<dyn AudioSink>>>,
    state: Arc<Mutex<SynthState>>,
    current: Arc<AtomicU64>,
    event_tx: mpsc::UnboundedSender<SynthEvent>,
    profile: VoiceProfile,
    sampler: LevelSampler,
    tick: Duration,
) {
    let is_current = |cur: &AtomicU64| cur.load(Ordering::SeqCst) == id;

    // Voice selection: explicit name → language prefix → first → none.
    let voices = match engine.voices() {
        Ok(v) => v,
        Err(e) => {
            log::debug!("voice listing unavailable ({e}); deferring to engine default");
            Vec::new()
        }
    };
    let voice = select_voice(&voices, &profile).cloned();

    let clip = match engine.synthesize(&text, voice.as_ref(), &profile) {
        Ok(clip) => clip,
        Err(e) => {
            if current.compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                log::warn!("synthesis failed: {e}");
                let _ = event_tx.send(SynthEvent::Error {
                    message: e.to_string(),
                });
            }
            return;
        }
    };

    // Start playback.  The guard check happens under the sink lock so a
    // concurrent stop() either runs before (we never start) or after (its
    // sink.stop() kills the clip we just queued).
    {
        let mut sink = sink.lock().unwrap();
        if !is_current(&current) {
            return;
        }
        if let Err(e) = sink.start(clip.samples.clone(), clip.sample_rate) {
            drop(sink);
            if current.compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                log::warn!("playback failed: {e}");
                let _ = event_tx.send(SynthEvent::Error {
                    message: e.to_string(),
                });
            }
            return;
        }
    }

    // State transition and Started go out under the state lock with an
    // ownership re-check, so a racing stop() can never order Cancelled
    // ahead of Started.
    {
        let mut st = state.lock().unwrap();
        if !is_current(&current) {
            return;
        }
        *st = SynthState::Speaking;
        let _ = event_tx.send(SynthEvent::Started);
    }
    log::debug!("speaking ({:.2}s clip): {text:?}", clip.duration_secs());

    // Envelope loop: advance through the synthesized waveform at playback
    // speed and emit one frame per tick.  The position freezes while paused.
    let window_len = ((clip.sample_rate as f64) * tick.as_secs_f64()) as usize;
    let mut played = Duration::ZERO;
    let mut last = Instant::now();

    loop {
        thread::sleep(tick);
        if !is_current(&current) {
            return;
        }

        let now = Instant::now();
        if *state.lock().unwrap() == SynthState::Speaking {
            played += now - last;
        }
        last = now;

        if sink.lock().unwrap().is_finished() {
            // The CAS (under the state lock) arbitrates the terminal
            // transition against stop() and a newer speak(); the loser
            // stays silent.
            let mut st = state.lock().unwrap();
            if current.compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
                *st = SynthState::Idle;
                let _ = event_tx.send(SynthEvent::Levels(sampler.reset()));
                let _ = event_tx.send(SynthEvent::Ended);
            }
            return;
        }

        let pos = (played.as_secs_f64() * clip.sample_rate as f64) as usize;
        let end = (pos + window_len).min(clip.samples.len());
        let window = &clip.samples[pos.min(end)..end];
        let frame = sampler.sample(&magnitude_bytes(window, MAGNITUDE_BANDS));

        // Emit under the state lock, re-checking ownership, so a concurrent
        // stop() cannot slot its zero frame in front of this one.
        {
            let _st = state.lock().unwrap();
            if !is_current(&current) {
                return;
            }
            let _ = event_tx.send(SynthEvent::Levels(frame));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
