//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle for the
//! speech-input side of the pipeline.  [`AudioCapture::start`] streams
//! [`AudioChunk`]s over an mpsc channel; the returned [`StreamHandle`] is a
//! RAII guard and dropping it stops the hardware stream, which is how the
//! input controller releases the microphone.
//!
//! `cpal::Stream` is not `Send`, so the capture object must stay on the
//! thread that created it — [`crate::audio::MicSource`] wraps this type in a
//! dedicated thread to give the controllers a `Send` handle.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc;
use thiserror::Error;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// One buffer of raw audio as delivered by the capture callback.
///
/// Samples are interleaved `f32` in `[-1.0, 1.0]` at the device's native
/// rate.  Downstream code uses [`crate::audio::downmix_to_mono`] and
/// [`crate::audio::resample_to_16k`] before recognition.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors raised while claiming or running the microphone.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No input device exists on the default audio host.
    #[error("no input device found on the default audio host")]
    NoDevice,

    /// A device was requested by name but is not present.
    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    /// The device would not report a default stream configuration.
    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// The platform rejected the stream configuration.
    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// The stream was built but would not start.
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The capture worker thread could not be started or died early.
    #[error("capture worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard keeping the cpal stream alive.
///
/// Dropping it stops the underlying hardware stream and releases the
/// microphone.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone wrapper over `cpal`.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the system default input device with its preferred configuration.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NoDevice`] when the host has no input device,
    /// [`CaptureError::DefaultConfig`] when it cannot report a configuration.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        Self::from_device(device)
    }

    /// Open a specific input device by name, or the default when `name` is
    /// `None`.
    ///
    /// The name must match `cpal`'s reported device name exactly (the value
    /// users see in their sound settings).
    ///
    /// # Errors
    ///
    /// [`CaptureError::DeviceNotFound`] when no input device carries `name`.
    pub fn with_device(name: Option<&str>) -> Result<Self, CaptureError> {
        let Some(wanted) = name else {
            return Self::new();
        };

        let host = cpal::default_host();
        let device = host
            .input_devices()
            .map_err(|_| CaptureError::NoDevice)?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()))?;

        Self::from_device(device)
    }

    fn from_device(device: cpal::Device) -> Result<Self, CaptureError> {
        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
        })
    }

    /// Begin streaming [`AudioChunk`]s to `tx`.
    ///
    /// The callback runs on cpal's audio thread; send failures (receiver
    /// dropped) are ignored so that thread never panics.
    ///
    /// # Errors
    ///
    /// [`CaptureError::BuildStream`] / [`CaptureError::PlayStream`] when the
    /// platform refuses the stream.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("capture stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    /// Native sample rate of the device in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels per chunk.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Chunks cross thread boundaries between the audio callback and the
    /// processing worker.
    #[test]
    fn audio_chunk_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AudioChunk>();
    }

    #[test]
    fn audio_chunk_carries_its_format() {
        let chunk = AudioChunk {
            samples: vec![0.0; 480],
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(chunk.samples.len(), 480);
        assert_eq!(chunk.sample_rate, 48_000);
        assert_eq!(chunk.channels, 2);
    }

    #[test]
    fn device_not_found_error_names_the_device() {
        let err = CaptureError::DeviceNotFound("USB Mic".into());
        assert!(err.to_string().contains("USB Mic"));
    }
}
