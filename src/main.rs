//! Application entry point — speak-score practice CLI.
//!
//! Runs one speak → listen → score round per target word given on the
//! command line:
//!
//! ```text
//! $ speak-score apple banana
//! ```
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the synthesis engine (espeak-ng) and playback sink (rodio).
//! 4. Build the recognition engine — degrades to a stub that reports the
//!    missing model instead of refusing to start.
//! 5. Create the tokio runtime and session channels.
//! 6. Spawn the [`PracticeSession`] runner and drive one round per word.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use speak_score::{
    audio::{MicSource, RodioSink},
    config::{AppConfig, AppPaths},
    listen::{RecognitionEngine, SpeechInput, UnavailableRecognizer, WhisperRecognizer},
    session::{new_shared_session, PracticeSession, SessionCommand, SessionEvent},
    synth::{EspeakEngine, SpeechOutput, VoiceProfile},
};

/// How long one attempt may run before the CLI forces an end.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("speak-score starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // Target words from argv, with a small default drill.
    let mut words: Vec<String> = std::env::args().skip(1).collect();
    if words.is_empty() {
        words = vec!["apple".into(), "banana".into(), "orange".into()];
    }

    // 3. Synthesis engine + playback sink
    let (output, synth_rx) = SpeechOutput::new(
        Arc::new(EspeakEngine::new()),
        Box::new(RodioSink::new()),
        VoiceProfile::from(&config.speech),
        &config.levels,
    );

    // 4. Recognition engine — degrade gracefully when the model is missing.
    let model_path = AppPaths::new().model_file(&config.recognizer.model);
    let recognizer: Arc<dyn RecognitionEngine> =
        match WhisperRecognizer::load(&model_path, config.listen.language.clone()) {
            Ok(engine) => {
                log::info!("recognition model loaded: {}", model_path.display());
                Arc::new(engine)
            }
            Err(e) => {
                log::warn!(
                    "Could not load recognition model ({}): {e}. Attempts will report an error.",
                    model_path.display()
                );
                Arc::new(UnavailableRecognizer::new(format!(
                    "recognition model missing: {}",
                    model_path.display()
                )))
            }
        };

    let (input, listen_rx) = SpeechInput::new(
        Box::new(MicSource::new(config.listen.audio_device.clone())),
        recognizer,
        config.listen.clone(),
        &config.levels,
    );

    // 5. Runtime and channels
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    let session = new_shared_session(config.levels.bins);
    let runner = PracticeSession::new(output, synth_rx, input, listen_rx, session);

    let (command_tx, command_rx) = mpsc::channel::<SessionCommand>(16);
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(32);

    // 6. Run the drill
    rt.block_on(async move {
        tokio::spawn(runner.run(command_rx, event_tx));
        drive_rounds(&words, command_tx, event_rx).await
    })
}

/// Run one prompt + attempt round per word and print the scores.
async fn drive_rounds(
    words: &[String],
    command_tx: mpsc::Sender<SessionCommand>,
    mut event_rx: mpsc::Receiver<SessionEvent>,
) -> anyhow::Result<()> {
    for word in words {
        println!("\n▶ Listen: {word}");
        command_tx
            .send(SessionCommand::SpeakPrompt { text: word.clone() })
            .await?;

        // Wait for the prompt to finish (or fail — the round continues
        // either way so a missing TTS engine doesn't block practice).
        loop {
            match event_rx.recv().await {
                Some(SessionEvent::PromptEnded) => break,
                Some(SessionEvent::Error { message }) => {
                    eprintln!("  (prompt failed: {message})");
                    break;
                }
                Some(_) => {}
                None => return Ok(()),
            }
        }

        println!("  Now you — say \"{word}\"");
        command_tx
            .send(SessionCommand::BeginAttempt {
                target: word.clone(),
            })
            .await?;

        // One-shot listening ends on its own after trailing silence; the
        // timeout is a backstop for a learner who never speaks.
        let scored = tokio::time::timeout(ATTEMPT_TIMEOUT, async {
            loop {
                match event_rx.recv().await {
                    Some(SessionEvent::Scored { comparison }) => return Some(comparison),
                    Some(SessionEvent::Error { message }) => {
                        eprintln!("  (attempt failed: {message})");
                        return None;
                    }
                    Some(_) => {}
                    None => return None,
                }
            }
        })
        .await;

        match scored {
            Ok(Some(comparison)) => {
                println!(
                    "  heard {:?} → {}/100 ({})",
                    comparison.recognized,
                    comparison.score,
                    comparison.rating().label()
                );
            }
            Ok(None) => {}
            Err(_) => {
                eprintln!("  (no speech detected — moving on)");
                command_tx.send(SessionCommand::Cancel).await?;
            }
        }
    }

    Ok(())
}
