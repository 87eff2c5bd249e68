//! Practice-session orchestrator — speak the prompt, capture the attempt,
//! score the transcript.
//!
//! [`PracticeSession`] owns one [`SpeechOutput`] and one [`SpeechInput`] and
//! responds to [`SessionCommand`]s received over a `tokio::sync::mpsc`
//! channel.
//!
//! # Round flow
//!
//! ```text
//! SessionCommand::SpeakPrompt { text }
//!   └─▶ SpeechOutput::speak           [Prompting]
//!
//! SessionCommand::BeginAttempt { target }
//!   └─▶ SpeechInput::start            [Listening]
//!         └─▶ ListenEvent::Final { text }
//!               └─▶ PronunciationScorer::score  [Scoring]
//!                     └─▶ SessionEvent::Scored  [Result]
//! ```
//!
//! The shared [`SharedSession`] snapshot is updated on every controller
//! event (level frames included) so a front end can render the round by
//! polling it each frame.

use tokio::sync::mpsc;

use crate::listen::{ListenEvent, SpeechInput};
use crate::score::{PronunciationScorer, UtteranceComparison};
use crate::synth::{SpeechOutput, SynthEvent};

use super::state::{SessionState, SharedSession};

// ---------------------------------------------------------------------------
// Commands and events
// ---------------------------------------------------------------------------

/// Commands sent from the front end to the session runner.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Speak the target word/phrase to the learner.
    SpeakPrompt { text: String },
    /// Start capturing the learner's attempt at `target`.
    BeginAttempt { target: String },
    /// Finish the attempt now and score whatever was captured.
    EndAttempt,
    /// Abort the round: stop all audio, discard the attempt unscored.
    Cancel,
}

/// Progress events delivered from the runner to the front end.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Prompt playback began.
    PromptStarted,
    /// Prompt playback finished (or was cut short by a new command).
    PromptEnded,
    /// The microphone is live; the learner may speak.
    AttemptStarted,
    /// An attempt was scored.
    Scored { comparison: UtteranceComparison },
    /// A controller reported a failure; the session is idle again.
    Error { message: String },
}

// ---------------------------------------------------------------------------
// PracticeSession
// ---------------------------------------------------------------------------

/// Drives the complete speak → listen → score round.
///
/// Create with [`PracticeSession::new`], then call [`run`](Self::run) inside
/// a tokio task.
pub struct PracticeSession {
    output: SpeechOutput,
    input: SpeechInput,
    synth_rx: mpsc::UnboundedReceiver<SynthEvent>,
    listen_rx: mpsc::UnboundedReceiver<ListenEvent>,
    scorer: PronunciationScorer,
    session: SharedSession,
}

impl PracticeSession {
    /// Wire a session from its two controllers and their event streams.
    ///
    /// # Arguments
    ///
    /// * `output` / `synth_rx` — synthesis controller and its events.
    /// * `input` / `listen_rx` — recognition controller and its events.
    /// * `session` — shared snapshot, also read by the front end.
    pub fn new(
        output: SpeechOutput,
        synth_rx: mpsc::UnboundedReceiver<SynthEvent>,
        input: SpeechInput,
        listen_rx: mpsc::UnboundedReceiver<ListenEvent>,
        session: SharedSession,
    ) -> Self {
        Self {
            output,
            input,
            synth_rx,
            listen_rx,
            scorer: PronunciationScorer::new(),
            session,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the session until `command_rx` closes.
    ///
    /// Spawn as a tokio task.  Both controllers are stopped on the way out,
    /// so dropping the command sender is a clean shutdown.
    pub async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        event_tx: mpsc::Sender<SessionEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = command_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(ev) = self.synth_rx.recv() => {
                    self.handle_synth_event(ev, &event_tx).await;
                }
                Some(ev) = self.listen_rx.recv() => {
                    self.handle_listen_event(ev, &event_tx).await;
                }
            }
        }

        log::info!("session: command channel closed, shutting down");
        self.output.stop();
        self.input.stop();
    }

    // -----------------------------------------------------------------------
    // Command handling
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::SpeakPrompt { text } => {
                log::debug!("session: SpeakPrompt {text:?}");
                // A prompt starts a fresh round: whatever attempt was in
                // flight is discarded unscored.
                {
                    let mut snap = self.session.lock().unwrap();
                    snap.target = None;
                    snap.interim_text = None;
                    snap.error_message = None;
                }
                self.input.stop();
                self.output.speak(text);
            }

            SessionCommand::BeginAttempt { target } => {
                log::debug!("session: BeginAttempt target={target:?}");
                self.output.stop();
                {
                    let mut snap = self.session.lock().unwrap();
                    snap.target = Some(target);
                    snap.interim_text = None;
                    snap.error_message = None;
                }
                self.input.start();
            }

            SessionCommand::EndAttempt => {
                log::debug!("session: EndAttempt");
                // The final transcript arrives as a ListenEvent and is
                // scored there.
                self.input.stop();
            }

            SessionCommand::Cancel => {
                log::debug!("session: Cancel");
                // Clear the target first so any Final emitted during
                // teardown is not scored.
                {
                    let mut snap = self.session.lock().unwrap();
                    snap.target = None;
                    snap.interim_text = None;
                }
                self.output.stop();
                self.input.stop();
                self.session.lock().unwrap().state = SessionState::Idle;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Controller events
    // -----------------------------------------------------------------------

    async fn handle_synth_event(&mut self, ev: SynthEvent, event_tx: &mpsc::Sender<SessionEvent>) {
        match ev {
            SynthEvent::Started => {
                self.session.lock().unwrap().state = SessionState::Prompting;
                let _ = event_tx.send(SessionEvent::PromptStarted).await;
            }
            SynthEvent::Levels(frame) => {
                self.session.lock().unwrap().levels = frame;
            }
            SynthEvent::Ended | SynthEvent::Cancelled => {
                {
                    let mut snap = self.session.lock().unwrap();
                    if snap.state == SessionState::Prompting {
                        snap.state = SessionState::Idle;
                    }
                }
                let _ = event_tx.send(SessionEvent::PromptEnded).await;
            }
            SynthEvent::Error { message } => {
                {
                    let mut snap = self.session.lock().unwrap();
                    snap.state = SessionState::Error;
                    snap.error_message = Some(message.clone());
                }
                let _ = event_tx.send(SessionEvent::Error { message }).await;
            }
        }
    }

    async fn handle_listen_event(
        &mut self,
        ev: ListenEvent,
        event_tx: &mpsc::Sender<SessionEvent>,
    ) {
        match ev {
            ListenEvent::Started => {
                self.session.lock().unwrap().state = SessionState::Listening;
                let _ = event_tx.send(SessionEvent::AttemptStarted).await;
            }
            ListenEvent::Levels(frame) => {
                self.session.lock().unwrap().levels = frame;
            }
            ListenEvent::Interim { text } => {
                self.session.lock().unwrap().interim_text = Some(text);
            }
            ListenEvent::Final { text } => {
                let target = self.session.lock().unwrap().target.clone();
                let Some(target) = target else {
                    // Round was cancelled or superseded — nothing to score.
                    return;
                };

                self.session.lock().unwrap().state = SessionState::Scoring;
                let comparison = self.scorer.score(&text, &target);
                log::debug!(
                    "session: scored {:?} vs {:?} → {}",
                    comparison.recognized,
                    comparison.target,
                    comparison.score
                );

                {
                    let mut snap = self.session.lock().unwrap();
                    snap.last_result = Some(comparison.clone());
                    snap.history.push(comparison.clone());
                    snap.interim_text = None;
                    snap.state = SessionState::Result;
                }
                let _ = event_tx.send(SessionEvent::Scored { comparison }).await;
            }
            ListenEvent::Error { message } => {
                {
                    let mut snap = self.session.lock().unwrap();
                    snap.state = SessionState::Error;
                    snap.error_message = Some(message.clone());
                }
                let _ = event_tx.send(SessionEvent::Error { message }).await;
            }
            ListenEvent::Stopped => {
                let mut snap = self.session.lock().unwrap();
                if snap.state == SessionState::Listening {
                    snap.state = SessionState::Idle;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioChunk, AudioSink, AudioSource, CaptureError, PlaybackError};
    use crate::config::{LevelsConfig, ListenConfig};
    use crate::listen::MockRecognizer;
    use crate::session::state::new_shared_session;
    use crate::synth::{MockSynthEngine, SynthError, VoiceProfile};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc as std_mpsc, Arc};
    use std::time::Duration;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Sink that drains every clip immediately.
    struct InstantSink;

    impl AudioSink for InstantSink {
        fn start(&mut self, _samples: Vec<f32>, _rate: u32) -> Result<(), PlaybackError> {
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn stop(&mut self) {}
        fn is_finished(&self) -> bool {
            true
        }
    }

    /// Source that feeds 200 ms of speech and then holds the line open.
    struct SpeechSource {
        open_flag: Arc<AtomicBool>,
        feeder: Option<(std_mpsc::Sender<()>, std::thread::JoinHandle<()>)>,
    }

    impl SpeechSource {
        fn new() -> Self {
            Self {
                open_flag: Arc::new(AtomicBool::new(false)),
                feeder: None,
            }
        }
    }

    impl AudioSource for SpeechSource {
        fn open(&mut self, tx: std_mpsc::Sender<AudioChunk>) -> Result<(), CaptureError> {
            if self.feeder.is_some() {
                return Ok(());
            }
            self.open_flag.store(true, Ordering::SeqCst);
            let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

            let handle = std::thread::spawn(move || {
                for _ in 0..20 {
                    let chunk = AudioChunk {
                        samples: vec![0.5; 160], // 10 ms of speech at 16 kHz
                        sample_rate: 16_000,
                        channels: 1,
                    };
                    if tx.send(chunk).is_err() {
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                let _ = shutdown_rx.recv();
            });

            self.feeder = Some((shutdown_tx, handle));
            Ok(())
        }

        fn close(&mut self) {
            if let Some((shutdown_tx, handle)) = self.feeder.take() {
                drop(shutdown_tx);
                let _ = handle.join();
            }
            self.open_flag.store(false, Ordering::SeqCst);
        }

        fn is_open(&self) -> bool {
            self.open_flag.load(Ordering::SeqCst)
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn fast_levels() -> LevelsConfig {
        LevelsConfig {
            bins: 20,
            interval_ms: 10,
        }
    }

    /// Long endpoint so only EndAttempt finishes the round.
    fn manual_listen_config() -> ListenConfig {
        ListenConfig {
            continuous: false,
            interim_results: false,
            endpoint_silence_ms: 10_000,
            ..ListenConfig::default()
        }
    }

    struct Harness {
        command_tx: mpsc::Sender<SessionCommand>,
        event_rx: mpsc::Receiver<SessionEvent>,
        session: SharedSession,
    }

    fn spawn_session(
        synth_engine: MockSynthEngine,
        recognizer: MockRecognizer,
    ) -> Harness {
        let session = new_shared_session(20);

        let (output, synth_rx) = SpeechOutput::new(
            Arc::new(synth_engine),
            Box::new(InstantSink),
            VoiceProfile::default(),
            &fast_levels(),
        );
        let (input, listen_rx) = SpeechInput::new(
            Box::new(SpeechSource::new()),
            Arc::new(recognizer),
            manual_listen_config(),
            &fast_levels(),
        );

        let runner = PracticeSession::new(
            output,
            synth_rx,
            input,
            listen_rx,
            Arc::clone(&session),
        );

        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(32);
        tokio::spawn(runner.run(command_rx, event_tx));

        Harness {
            command_tx,
            event_rx,
            session,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for session event")
            .expect("session event channel closed")
    }

    async fn wait_for_scored(rx: &mut mpsc::Receiver<SessionEvent>) -> UtteranceComparison {
        loop {
            if let SessionEvent::Scored { comparison } = next_event(rx).await {
                return comparison;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    /// The golden path: prompt "apple", learner echoes "apple", max score.
    #[tokio::test]
    async fn full_round_perfect_attempt_scores_100() {
        let mut h = spawn_session(MockSynthEngine::ok(), MockRecognizer::ok("apple"));

        h.command_tx
            .send(SessionCommand::SpeakPrompt {
                text: "apple".into(),
            })
            .await
            .unwrap();

        assert!(matches!(next_event(&mut h.event_rx).await, SessionEvent::PromptStarted));
        assert!(matches!(next_event(&mut h.event_rx).await, SessionEvent::PromptEnded));

        h.command_tx
            .send(SessionCommand::BeginAttempt {
                target: "apple".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.event_rx).await,
            SessionEvent::AttemptStarted
        ));

        // Give the fake mic time to feed the attempt, then finish it.
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.command_tx.send(SessionCommand::EndAttempt).await.unwrap();

        let comparison = wait_for_scored(&mut h.event_rx).await;
        assert_eq!(comparison.recognized, "apple");
        assert_eq!(comparison.target, "apple");
        assert_eq!(comparison.score, 100);

        let snap = h.session.lock().unwrap();
        assert_eq!(snap.state, SessionState::Result);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.last_result.as_ref().unwrap().score, 100);
    }

    /// A misrecognized attempt gets the edit-distance score, not zero.
    #[tokio::test]
    async fn misrecognized_attempt_scores_partial_credit() {
        let mut h = spawn_session(MockSynthEngine::ok(), MockRecognizer::ok("appel"));

        h.command_tx
            .send(SessionCommand::BeginAttempt {
                target: "apple".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.event_rx).await,
            SessionEvent::AttemptStarted
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.command_tx.send(SessionCommand::EndAttempt).await.unwrap();

        let comparison = wait_for_scored(&mut h.event_rx).await;
        assert_eq!(comparison.score, 60); // d=2 over length 5
    }

    /// A broken synthesis engine surfaces one Error and the session keeps
    /// working for the attempt phase.
    #[tokio::test]
    async fn prompt_failure_reports_error_but_attempt_still_works() {
        let mut h = spawn_session(
            MockSynthEngine::err(SynthError::EngineUnavailable(
                "espeak-ng not found in PATH".into(),
            )),
            MockRecognizer::ok("apple"),
        );

        h.command_tx
            .send(SessionCommand::SpeakPrompt {
                text: "apple".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.event_rx).await,
            SessionEvent::Error { .. }
        ));

        h.command_tx
            .send(SessionCommand::BeginAttempt {
                target: "apple".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.event_rx).await,
            SessionEvent::AttemptStarted
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        h.command_tx.send(SessionCommand::EndAttempt).await.unwrap();

        let comparison = wait_for_scored(&mut h.event_rx).await;
        assert_eq!(comparison.score, 100);
    }

    /// Cancel discards the attempt: no Scored event, snapshot back to idle.
    #[tokio::test]
    async fn cancel_discards_the_attempt_unscored() {
        let mut h = spawn_session(MockSynthEngine::ok(), MockRecognizer::ok("apple"));

        h.command_tx
            .send(SessionCommand::BeginAttempt {
                target: "apple".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.event_rx).await,
            SessionEvent::AttemptStarted
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        h.command_tx.send(SessionCommand::Cancel).await.unwrap();

        // No Scored may arrive; the channel simply goes quiet.
        let quiet =
            tokio::time::timeout(Duration::from_millis(300), wait_for_scored(&mut h.event_rx))
                .await;
        assert!(quiet.is_err(), "cancelled attempt was scored anyway");

        let snap = h.session.lock().unwrap();
        assert!(snap.history.is_empty());
        assert!(snap.target.is_none());
        assert_eq!(snap.state, SessionState::Idle);
    }

    /// Level frames from the live microphone reach the shared snapshot.
    #[tokio::test]
    async fn snapshot_receives_live_level_frames() {
        let mut h = spawn_session(MockSynthEngine::ok(), MockRecognizer::ok("apple"));

        h.command_tx
            .send(SessionCommand::BeginAttempt {
                target: "apple".into(),
            })
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.event_rx).await,
            SessionEvent::AttemptStarted
        ));

        // Poll the snapshot while the fake mic feeds speech.
        let mut saw_live_frame = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if h.session.lock().unwrap().levels.peak() > 0.0 {
                saw_live_frame = true;
                break;
            }
        }
        assert!(saw_live_frame, "snapshot never saw a live level frame");

        h.command_tx.send(SessionCommand::EndAttempt).await.unwrap();
        let _ = wait_for_scored(&mut h.event_rx).await;
    }
}
