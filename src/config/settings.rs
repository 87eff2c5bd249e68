//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the speech-synthesis side (prompt playback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// BCP-47 language tag for prompts (e.g. `"en-US"`, `"en-GB"`).
    pub language: String,
    /// Preferred voice name — `None` selects by language prefix instead.
    pub voice: Option<String>,
    /// Speaking-rate multiplier; `1.0` is the engine's natural pace.
    pub rate: f32,
    /// Pitch multiplier; `1.0` is the voice's natural pitch.
    pub pitch: f32,
    /// Output volume in `[0.0, 1.0]`.
    pub volume: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            language: "en-US".into(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// ListenConfig
// ---------------------------------------------------------------------------

/// Settings for the speech-recognition side (attempt capture).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    /// ISO-639-1 language the learner is practicing (e.g. `"en"`).
    pub language: String,
    /// Keep listening for further utterances after a final transcript.
    /// When `false` the controller releases the microphone after the first
    /// final result.
    pub continuous: bool,
    /// Emit provisional transcripts while the learner is still speaking.
    pub interim_results: bool,
    /// How often interim recognition passes run, in milliseconds.
    pub interim_interval_ms: u64,
    /// Trailing silence that ends an utterance, in milliseconds.
    pub endpoint_silence_ms: u32,
    /// RMS amplitude below which a frame counts as silence.
    pub silence_threshold: f32,
    /// Audio input device name — `None` means the system default.
    pub audio_device: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            continuous: false,
            interim_results: true,
            interim_interval_ms: 1_500,
            endpoint_silence_ms: 800,
            silence_threshold: 0.01,
            audio_device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RecognizerConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper recognition engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizerConfig {
    /// GGML model name / file stem (e.g. `"ggml-base.en"`).
    pub model: String,
    /// Attempt GPU-accelerated inference when available.
    pub use_gpu: bool,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model: "ggml-base.en".into(),
            use_gpu: false,
        }
    }
}

// ---------------------------------------------------------------------------
// LevelsConfig
// ---------------------------------------------------------------------------

/// Settings for the level-frame visualization feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelsConfig {
    /// Number of bins per frame (the visualization's column count).
    pub bins: usize,
    /// Sampling period while audio is active, in milliseconds.
    pub interval_ms: u64,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            bins: crate::audio::DEFAULT_BINS,
            interval_ms: crate::audio::DEFAULT_INTERVAL_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use speak_score::config::AppConfig;
///
/// // Load (returns Default when the file is missing)
/// let config = AppConfig::load().unwrap();
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Speech-synthesis settings.
    pub speech: SpeechConfig,
    /// Speech-recognition capture settings.
    pub listen: ListenConfig,
    /// Whisper engine settings.
    pub recognizer: RecognizerConfig,
    /// Level-frame feed settings.
    pub levels: LevelsConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
