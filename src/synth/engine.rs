//! Speech-synthesis engine trait and implementations.
//!
//! # Overview
//!
//! [`SynthesisEngine`] is the boundary to the host's text-to-speech
//! capability.  It is object-safe and `Send + Sync` so it can be held behind
//! an `Arc<dyn SynthesisEngine>` and called from worker threads.
//!
//! [`EspeakEngine`] is the production implementation: it shells out to
//! `espeak-ng`, captures the WAV stream from stdout and decodes it to PCM.
//! A missing binary maps to [`SynthError::EngineUnavailable`], the
//! engine-missing error class the controllers report without retrying.
//!
//! [`MockSynthEngine`] (under `#[cfg(test)]`) produces deterministic audio
//! without any external process.

use std::io::Cursor;
use std::process::Command;

use thiserror::Error;

use crate::config::SpeechConfig;

// ---------------------------------------------------------------------------
// SynthError
// ---------------------------------------------------------------------------

/// All errors that can arise from the synthesis subsystem.
#[derive(Debug, Clone, Error)]
pub enum SynthError {
    /// The synthesis engine is not present in the host environment.
    #[error("speech synthesis engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The engine ran but failed to produce audio.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// The engine produced output this crate could not decode.
    #[error("could not decode synthesized audio: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// VoiceInfo / VoiceProfile
// ---------------------------------------------------------------------------

/// One voice offered by a synthesis engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Engine-specific voice name (e.g. `"english_rp"`).
    pub name: String,
    /// Language tag the voice speaks (e.g. `"en-gb"`).
    pub language: String,
}

/// Per-utterance synthesis settings, carried from [`SpeechConfig`].
#[derive(Debug, Clone)]
pub struct VoiceProfile {
    /// BCP-47 language tag used for voice selection and engine fallback.
    pub language: String,
    /// Explicit voice name; takes precedence over language matching.
    pub voice: Option<String>,
    /// Speaking-rate multiplier (`1.0` = natural pace).
    pub rate: f32,
    /// Pitch multiplier (`1.0` = natural pitch).
    pub pitch: f32,
    /// Volume in `[0.0, 1.0]`.
    pub volume: f32,
}

impl Default for VoiceProfile {
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

impl From<&SpeechConfig> for VoiceProfile {
    fn from(cfg: &SpeechConfig) -> Self {
        Self {
            language: cfg.language.clone(),
            voice: cfg.voice.clone(),
            rate: cfg.rate,
            pitch: cfg.pitch,
            volume: cfg.volume,
        }
    }
}

// ---------------------------------------------------------------------------
// SynthesizedAudio
// ---------------------------------------------------------------------------

/// Decoded PCM produced by a synthesis engine: mono `f32` in `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Mono PCM samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// SynthesisEngine trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for speech-synthesis engines.
pub trait SynthesisEngine: Send + Sync {
    /// Render `text` as PCM using `voice` (already selected by the caller)
    /// and the remaining `profile` settings.
    ///
    /// `voice` of `None` lets the engine pick from `profile.language`.
    fn synthesize(
        &self,
        text: &str,
        voice: Option<&VoiceInfo>,
        profile: &VoiceProfile,
    ) -> Result<SynthesizedAudio, SynthError>;

    /// All voices the engine offers.
    fn voices(&self) -> Result<Vec<VoiceInfo>, SynthError>;
}

// Compile-time assertion: Box<dyn SynthesisEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SynthesisEngine>) {}
};

// ---------------------------------------------------------------------------
// select_voice
// ---------------------------------------------------------------------------

/// Pick a voice for `profile` from `voices`.
///
/// Precedence: explicit voice-name match (case-insensitive) → language-prefix
/// match on the primary subtag (`"en-US"` matches any `"en…"` voice) → first
/// available voice → `None` when the engine offers nothing.
pub fn select_voice<'a>(voices: &'a [VoiceInfo], profile: &VoiceProfile) -> Option<&'a VoiceInfo> {
    if let Some(wanted) = &profile.voice {
        if let Some(v) = voices
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(wanted))
        {
            return Some(v);
        }
    }

    let primary = profile
        .language
        .split(['-', '_'])
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    if !primary.is_empty() {
        if let Some(v) = voices
            .iter()
            .find(|v| v.language.to_ascii_lowercase().starts_with(&primary))
        {
            return Some(v);
        }
    }

    voices.first()
}

// ---------------------------------------------------------------------------
// EspeakEngine
// ---------------------------------------------------------------------------

/// Production synthesis engine shelling out to `espeak-ng`.
///
/// Each [`synthesize`](SynthesisEngine::synthesize) call runs
/// `espeak-ng --stdout` and decodes the resulting WAV, so the engine is
/// stateless and freely shareable.
pub struct EspeakEngine {
    binary: String,
}

impl EspeakEngine {
    /// Use `espeak-ng` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("espeak-ng")
    }

    /// Use an explicit binary path (useful when the engine is bundled).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, SynthError> {
        let output = Command::new(&self.binary).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SynthError::EngineUnavailable(format!("{} not found in PATH", self.binary))
            } else {
                SynthError::Synthesis(e.to_string())
            }
        })?;

        if !output.status.success() {
            return Err(SynthError::Synthesis(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(output.stdout)
    }
}

impl Default for EspeakEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthesisEngine for EspeakEngine {
    fn synthesize(
        &self,
        text: &str,
        voice: Option<&VoiceInfo>,
        profile: &VoiceProfile,
    ) -> Result<SynthesizedAudio, SynthError> {
        // espeak-ng accepts either a voice name or a language tag after -v.
        let voice_arg = voice
            .map(|v| v.name.clone())
            .unwrap_or_else(|| profile.language.to_ascii_lowercase());

        // espeak's natural pace is 175 wpm; pitch is 0–99 around a 50 centre;
        // amplitude is 0–200 around a 100 centre.
        let speed = ((175.0 * profile.rate).clamp(80.0, 450.0) as u32).to_string();
        let pitch = ((50.0 * profile.pitch).clamp(0.0, 99.0) as u32).to_string();
        let amplitude = ((100.0 * profile.volume).clamp(0.0, 200.0) as u32).to_string();

        let wav = self.run(&[
            "--stdout",
            "-v",
            &voice_arg,
            "-s",
            &speed,
            "-p",
            &pitch,
            "-a",
            &amplitude,
            text,
        ])?;

        decode_wav(&wav)
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>, SynthError> {
        let listing = self.run(&["--voices"])?;
        Ok(parse_voice_listing(&String::from_utf8_lossy(&listing)))
    }
}

/// Decode a 16-bit PCM WAV byte stream into mono `f32` samples.
fn decode_wav(bytes: &[u8]) -> Result<SynthesizedAudio, SynthError> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| SynthError::Decode(e.to_string()))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()
            .map_err(|e| SynthError::Decode(e.to_string()))?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| SynthError::Decode(e.to_string()))?,
    };

    let mono = crate::audio::downmix_to_mono(&samples, spec.channels);

    Ok(SynthesizedAudio {
        samples: mono,
        sample_rate: spec.sample_rate,
    })
}

/// Parse `espeak-ng --voices` output.
///
/// The listing is a fixed-order table:
/// `Pty Language Age/Gender VoiceName File Other Languages`; the header row
/// and any malformed line are skipped.
fn parse_voice_listing(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(VoiceInfo {
                name: fields[3].to_string(),
                language: fields[1].to_string(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MockSynthEngine  (test-only)
// ---------------------------------------------------------------------------

/// A test double that renders a fixed clip without any external engine.
#[cfg(test)]
pub struct MockSynthEngine {
    response: Result<SynthesizedAudio, SynthError>,
    voices: Vec<VoiceInfo>,
    /// Every text passed to `synthesize`, for assertions.
    pub spoken: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockSynthEngine {
    /// 100 ms of constant-amplitude audio at 16 kHz.
    pub fn ok() -> Self {
        Self::with_clip(SynthesizedAudio {
            samples: vec![0.5; 1_600],
            sample_rate: 16_000,
        })
    }

    /// A mock that always returns the given clip.
    pub fn with_clip(clip: SynthesizedAudio) -> Self {
        Self {
            response: Ok(clip),
            voices: vec![VoiceInfo {
                name: "mock".into(),
                language: "en".into(),
            }],
            spoken: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// A mock that always fails with `error`.
    pub fn err(error: SynthError) -> Self {
        Self {
            response: Err(error),
            voices: Vec::new(),
            spoken: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Override the advertised voice list.
    pub fn with_voices(mut self, voices: Vec<VoiceInfo>) -> Self {
        self.voices = voices;
        self
    }
}

#[cfg(test)]
impl SynthesisEngine for MockSynthEngine {
    fn synthesize(
        &self,
        text: &str,
        _voice: Option<&VoiceInfo>,
        _profile: &VoiceProfile,
    ) -> Result<SynthesizedAudio, SynthError> {
        self.spoken.lock().unwrap().push(text.to_string());
        self.response.clone()
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>, SynthError> {
        Ok(self.voices.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(name: &str, language: &str) -> VoiceInfo {
        VoiceInfo {
            name: name.into(),
            language: language.into(),
        }
    }

    // ---- select_voice ------------------------------------------------------

    #[test]
    fn explicit_name_wins() {
        let voices = vec![voice("english_us", "en-us"), voice("english_rp", "en-gb")];
        let profile = VoiceProfile {
            voice: Some("English_RP".into()), // case-insensitive
            ..VoiceProfile::default()
        };
        assert_eq!(select_voice(&voices, &profile).unwrap().name, "english_rp");
    }

    #[test]
    fn language_prefix_matches_when_name_missing() {
        let voices = vec![voice("french", "fr"), voice("english_us", "en-us")];
        let profile = VoiceProfile {
            language: "en-US".into(),
            ..VoiceProfile::default()
        };
        assert_eq!(select_voice(&voices, &profile).unwrap().name, "english_us");
    }

    #[test]
    fn unknown_name_falls_back_to_language() {
        let voices = vec![voice("english_us", "en-us")];
        let profile = VoiceProfile {
            voice: Some("does-not-exist".into()),
            language: "en".into(),
            ..VoiceProfile::default()
        };
        assert_eq!(select_voice(&voices, &profile).unwrap().name, "english_us");
    }

    #[test]
    fn first_voice_when_language_has_no_match() {
        let voices = vec![voice("german", "de"), voice("french", "fr")];
        let profile = VoiceProfile {
            language: "en-US".into(),
            ..VoiceProfile::default()
        };
        assert_eq!(select_voice(&voices, &profile).unwrap().name, "german");
    }

    #[test]
    fn empty_voice_list_selects_none() {
        assert!(select_voice(&[], &VoiceProfile::default()).is_none());
    }

    // ---- voice listing parser ----------------------------------------------

    #[test]
    fn parses_espeak_voice_table() {
        let listing = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  en-gb           M  english_rp          gmw/en-GB-x-rp
 2  en-us           M  english_us          gmw/en-US
 5  fr              M  french              roa/fr
malformed line
";
        let voices = parse_voice_listing(listing);
        assert_eq!(voices.len(), 3);
        assert_eq!(voices[0].name, "english_rp");
        assert_eq!(voices[0].language, "en-gb");
        assert_eq!(voices[2].language, "fr");
    }

    // ---- EspeakEngine availability -----------------------------------------

    #[test]
    fn missing_binary_reports_engine_unavailable() {
        let engine = EspeakEngine::with_binary("/nonexistent/espeak-ng");
        let result = engine.synthesize("hello", None, &VoiceProfile::default());
        assert!(
            matches!(result, Err(SynthError::EngineUnavailable(_))),
            "expected EngineUnavailable, got {result:?}"
        );
    }

    #[test]
    fn missing_binary_reports_unavailable_for_voices_too() {
        let engine = EspeakEngine::with_binary("/nonexistent/espeak-ng");
        assert!(matches!(
            engine.voices(),
            Err(SynthError::EngineUnavailable(_))
        ));
    }

    // ---- MockSynthEngine ---------------------------------------------------

    #[test]
    fn mock_records_spoken_text() {
        let engine = MockSynthEngine::ok();
        engine
            .synthesize("apple", None, &VoiceProfile::default())
            .unwrap();
        assert_eq!(engine.spoken.lock().unwrap().as_slice(), ["apple"]);
    }

    #[test]
    fn mock_err_propagates() {
        let engine = MockSynthEngine::err(SynthError::Synthesis("boom".into()));
        let err = engine
            .synthesize("apple", None, &VoiceProfile::default())
            .unwrap_err();
        assert!(matches!(err, SynthError::Synthesis(_)));
    }

    // ---- SynthesizedAudio --------------------------------------------------

    #[test]
    fn duration_from_rate_and_length() {
        let clip = SynthesizedAudio {
            samples: vec![0.0; 8_000],
            sample_rate: 16_000,
        };
        assert!((clip.duration_secs() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_rate_duration_is_zero() {
        let clip = SynthesizedAudio {
            samples: vec![0.0; 100],
            sample_rate: 0,
        };
        assert_eq!(clip.duration_secs(), 0.0);
    }

    // ---- object safety -----------------------------------------------------

    #[test]
    fn box_dyn_engine_compiles() {
        let engine: Box<dyn SynthesisEngine> = Box::new(MockSynthEngine::ok());
        let _ = engine.voices();
    }
}
