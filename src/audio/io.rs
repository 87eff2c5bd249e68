//! Hardware audio boundaries — microphone source and playback sink.
//!
//! The speech controllers never touch `cpal` or `rodio` directly; they hold
//! [`AudioSource`] / [`AudioSink`] trait objects so tests can substitute
//! deterministic fakes.  The production implementations here own their
//! hardware streams on dedicated threads because neither `cpal::Stream` nor
//! `rodio::OutputStream` is `Send`, while the controllers live inside tokio
//! tasks that are.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use thiserror::Error;

use crate::audio::capture::{AudioCapture, AudioChunk, CaptureError};

// ---------------------------------------------------------------------------
// AudioSource
// ---------------------------------------------------------------------------

/// An exclusive claim on an audio input device.
///
/// Exactly one claim may be live per source: a second [`open`](Self::open)
/// while already open is a no-op success.  [`close`](Self::close) must always
/// release the device — the input controller relies on this to never leak the
/// microphone.
pub trait AudioSource: Send {
    /// Claim the device and begin streaming [`AudioChunk`]s to `tx`.
    fn open(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<(), CaptureError>;

    /// Release the device.  Idempotent.
    fn close(&mut self);

    /// `true` while the device is claimed.
    fn is_open(&self) -> bool;
}

// ---------------------------------------------------------------------------
// MicSource
// ---------------------------------------------------------------------------

/// Production [`AudioSource`] backed by [`AudioCapture`].
///
/// The cpal stream lives on a `mic-capture` thread that parks until
/// [`close`](AudioSource::close); this keeps the non-`Send` stream off the
/// caller's thread while `MicSource` itself stays `Send`.
pub struct MicSource {
    device_name: Option<String>,
    worker: Option<MicWorker>,
}

struct MicWorker {
    /// Dropping this sender unparks the capture thread, which then drops the
    /// stream handle and exits.
    shutdown_tx: mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl MicSource {
    /// Capture from the named input device, or the system default when
    /// `device_name` is `None`.
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            worker: None,
        }
    }
}

impl AudioSource for MicSource {
    fn open(&mut self, tx: mpsc::Sender<AudioChunk>) -> Result<(), CaptureError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let device_name = self.device_name.clone();

        let thread = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let capture = match AudioCapture::with_device(device_name.as_deref()) {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let handle = match capture.start(tx) {
                    Ok(h) => h,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                log::debug!(
                    "microphone claimed ({} Hz, {} ch)",
                    capture.sample_rate(),
                    capture.channels()
                );
                let _ = ready_tx.send(Ok(()));

                // Park until close() drops the shutdown sender.
                let _ = shutdown_rx.recv();
                drop(handle);
                log::debug!("microphone released");
            })
            .map_err(|e| CaptureError::Worker(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(MicWorker {
                    shutdown_tx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(CaptureError::Worker(
                    "capture thread exited before reporting readiness".into(),
                ))
            }
        }
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.shutdown_tx);
            let _ = worker.thread.join();
        }
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

/// Errors raised while opening or driving the playback device.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// No usable output device, or the device refused the stream.
    #[error("audio output unavailable: {0}")]
    NoOutputDevice(String),

    /// The playback worker thread could not be started or died early.
    #[error("playback worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// AudioSink
// ---------------------------------------------------------------------------

/// A playback slot for synthesized speech.
///
/// At most one clip plays at a time; [`start`](Self::start) replaces whatever
/// was playing.  `pause`/`resume`/`stop` act on the current clip and are
/// no-ops when nothing is playing.
pub trait AudioSink: Send {
    /// Begin playing mono PCM at `sample_rate`, replacing any current clip.
    fn start(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<(), PlaybackError>;

    /// Suspend the current clip, keeping its position.
    fn pause(&mut self);

    /// Continue a paused clip.
    fn resume(&mut self);

    /// Discard the current clip immediately.
    fn stop(&mut self);

    /// `true` when no clip is playing or the current clip has drained.
    fn is_finished(&self) -> bool;
}

// ---------------------------------------------------------------------------
// RodioSink
// ---------------------------------------------------------------------------

/// Production [`AudioSink`] backed by `rodio`.
///
/// Each clip gets a `speech-playback` thread that owns the output stream for
/// the clip's lifetime; the `rodio::Sink` handle is shared back so
/// pause/resume/stop work from the controller's thread.
pub struct RodioSink {
    playing: Option<ActivePlayback>,
}

struct ActivePlayback {
    sink: Arc<rodio::Sink>,
    thread: thread::JoinHandle<()>,
}

impl RodioSink {
    pub fn new() -> Self {
        Self { playing: None }
    }
}

impl Default for RodioSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for RodioSink {
    fn start(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<(), PlaybackError> {
        self.stop();

        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<rodio::Sink>, PlaybackError>>();

        let thread = thread::Builder::new()
            .name("speech-playback".into())
            .spawn(move || {
                let (_stream, handle) = match rodio::OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError::NoOutputDevice(e.to_string())));
                        return;
                    }
                };

                let sink = match rodio::Sink::try_new(&handle) {
                    Ok(s) => Arc::new(s),
                    Err(e) => {
                        let _ = ready_tx.send(Err(PlaybackError::NoOutputDevice(e.to_string())));
                        return;
                    }
                };

                sink.append(rodio::buffer::SamplesBuffer::new(1, sample_rate, samples));
                let _ = ready_tx.send(Ok(Arc::clone(&sink)));

                // Keep the output stream alive until the clip drains or the
                // controller calls stop().
                sink.sleep_until_end();
            })
            .map_err(|e| PlaybackError::Worker(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(sink)) => {
                self.playing = Some(ActivePlayback { sink, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(PlaybackError::Worker(
                    "playback thread exited before reporting readiness".into(),
                ))
            }
        }
    }

    fn pause(&mut self) {
        if let Some(p) = &self.playing {
            p.sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(p) = &self.playing {
            p.sink.play();
        }
    }

    fn stop(&mut self) {
        if let Some(p) = self.playing.take() {
            p.sink.stop();
            let _ = p.thread.join();
        }
    }

    fn is_finished(&self) -> bool {
        self.playing.as_ref().map(|p| p.sink.empty()).unwrap_or(true)
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
