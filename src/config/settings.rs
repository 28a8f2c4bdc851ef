//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and handed to each
//! component's constructor.  Every section is `#[serde(default)]`, so a
//! `settings.toml` only needs to mention the values it overrides.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Microphone capture and speaker playback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rate of every [`AudioFrame`](crate::audio::AudioFrame) delivered to
    /// the pipeline.  Whisper and the wake scorer both expect 16 000 Hz.
    pub capture_sample_rate: u32,
    /// Samples per frame (1280 = 80 ms at 16 kHz).
    pub block_size: usize,
    /// Capacity of the bounded frame channel between capture and the loop.
    pub frame_queue_capacity: usize,
    /// Rate of synthesized speech handed to the output device.
    pub playback_sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: 16_000,
            block_size: 1_280,
            frame_queue_capacity: 64,
            playback_sample_rate: 24_000,
        }
    }
}

// ---------------------------------------------------------------------------
// WakeConfig
// ---------------------------------------------------------------------------

/// Wake-word gating settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// When `false` the pipeline starts (and stays) in always-listening mode.
    pub enabled: bool,
    /// Label whose score is compared against `threshold`.
    pub label: String,
    /// Phrases recognised by the transcript-based scorer.
    pub phrases: Vec<String>,
    /// Confidence a frame must exceed to trigger.
    pub threshold: f32,
    /// Minimum seconds between two triggers.
    pub cooldown_secs: f32,
    /// Length of the scorer's rolling audio window.
    pub window_secs: f32,
    /// Log per-frame scores and suppressed triggers.
    pub debug: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            label: "hey_jarvis".into(),
            phrases: vec!["hey jarvis".into(), "hey jett".into()],
            threshold: 0.5,
            cooldown_secs: 2.0,
            window_secs: 2.0,
            debug: false,
        }
    }
}

impl WakeConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.cooldown_secs.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// EndpointConfig
// ---------------------------------------------------------------------------

/// How the endpointer decides whether a frame contains speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SilenceMode {
    /// Fixed RMS threshold.
    Energy,
    /// RMS compared against a tracked noise floor (never below `threshold`).
    Adaptive,
}

impl Default for SilenceMode {
    fn default() -> Self {
        Self::Energy
    }
}

/// End-of-speech detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub mode: SilenceMode,
    /// RMS level above which a frame counts as speech.
    pub threshold: f32,
    /// Seconds of consecutive silence that end an utterance.
    pub silence_secs: f32,
    /// Hard cap on one recording window.
    pub max_record_secs: f32,
    /// Recordings with fewer frames than this are reported as "no speech".
    pub min_frames: usize,
    /// Adaptive mode: speech must be this many times louder than the floor.
    pub adaptive_ratio: f32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            mode: SilenceMode::default(),
            threshold: 0.005,
            silence_secs: 0.5,
            max_record_secs: 30.0,
            min_frames: 5,
            adaptive_ratio: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SttConfig
// ---------------------------------------------------------------------------

/// Settings for the Whisper STT engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// GGML model file name under the models directory.
    pub model_file: String,
    /// ISO-639-1 language code, or `"auto"`.
    pub language: String,
    /// Inference threads; `None` picks a value from the CPU count.
    pub threads: Option<i32>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            model_file: "ggml-distil-large-v3.bin".into(),
            language: "en".into(),
            threads: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TtsConfig
// ---------------------------------------------------------------------------

/// Settings for the OpenAI-compatible speech endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub base_url: String,
    pub model: String,
    pub voice: String,
    pub speed: f32,
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8880".into(),
            model: "kokoro".into(),
            voice: "af_heart".into(),
            speed: 1.0,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

/// Which generator(s) the router may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Always the local backend.
    #[default]
    Local,
    /// Always the remote backend.
    Remote,
    /// Classify each prompt.
    Hybrid,
}

/// Local Ollama backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLlmConfig {
    pub base_url: String,
    pub model: String,
    /// Upper bound on generated tokens per reply.
    pub num_predict: u32,
    pub timeout_secs: u64,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "qwen3:8b".into(),
            num_predict: 80,
            timeout_secs: 60,
        }
    }
}

/// Remote Anthropic backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLlmConfig {
    pub base_url: String,
    /// `None` falls back to the `ANTHROPIC_API_KEY` environment variable.
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub timeout_secs: u64,
}

impl Default for RemoteLlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            api_key: None,
            model: "claude-sonnet-4-5".into(),
            max_tokens: 150,
            system_prompt: "You are a helpful voice assistant. \
                            Keep responses concise, 1 to 3 sentences. \
                            Be direct and conversational."
                .into(),
            timeout_secs: 60,
        }
    }
}

/// Response generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LlmConfig {
    pub router_mode: RouterMode,
    pub local: LocalLlmConfig,
    pub remote: RemoteLlmConfig,
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Streaming synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// The first unit may be flushed early once the buffer holds this many
    /// characters and a comma.
    pub min_first_chars: usize,
    /// ...or unconditionally once it holds this many.
    pub max_first_chars: usize,
    /// A comma closer to the start than this is ignored for the early split.
    pub min_comma_offset: usize,
    /// Upper bound on waiting for playback to drain after generation ends.
    pub drain_timeout_secs: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            min_first_chars: 20,
            max_first_chars: 40,
            min_comma_offset: 10,
            drain_timeout_secs: 30.0,
        }
    }
}

impl SpeechConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.drain_timeout_secs.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Control-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest single blocking wait in the loop.  Bounds shutdown latency.
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

impl PipelineConfig {
    /// Poll interval, clamped below one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.clamp(1, 999))
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub wake: WakeConfig,
    pub endpoint: EndpointConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Pretty TOML rendering of the effective configuration.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert!(config.wake.enabled);
        assert_eq!(config.audio.capture_sample_rate, 16_000);
        assert_eq!(config.audio.playback_sample_rate, 24_000);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.audio.block_size, 1_280);
        assert_eq!(cfg.wake.threshold, 0.5);
        assert_eq!(cfg.wake.cooldown(), Duration::from_secs(2));
        assert_eq!(cfg.endpoint.mode, SilenceMode::Energy);
        assert_eq!(cfg.endpoint.min_frames, 5);
        assert_eq!(cfg.llm.router_mode, RouterMode::Local);
        assert!(cfg.llm.remote.api_key.is_none());
        assert_eq!(cfg.speech.min_first_chars, 20);
        assert_eq!(cfg.speech.max_first_chars, 40);
        assert_eq!(cfg.speech.min_comma_offset, 10);
        assert!(cfg.pipeline.poll_interval() < Duration::from_secs(1));
    }

    #[test]
    fn modified_values_survive_save_and_load() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("settings.toml");

        let mut cfg = AppConfig::default();
        cfg.wake.enabled = false;
        cfg.endpoint.mode = SilenceMode::Adaptive;
        cfg.endpoint.silence_secs = 1.0;
        cfg.llm.router_mode = RouterMode::Hybrid;
        cfg.llm.remote.api_key = Some("sk-test".into());
        cfg.tts.voice = "bf_emma".into();

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert!(!loaded.wake.enabled);
        assert_eq!(loaded.endpoint.mode, SilenceMode::Adaptive);
        assert_eq!(loaded.endpoint.silence_secs, 1.0);
        assert_eq!(loaded.llm.router_mode, RouterMode::Hybrid);
        assert_eq!(loaded.llm.remote.api_key.as_deref(), Some("sk-test"));
        assert_eq!(loaded.tts.voice, "bf_emma");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[endpoint]\nmode = \"adaptive\"\n\n[llm]\nrouter_mode = \"remote\"\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.endpoint.mode, SilenceMode::Adaptive);
        assert_eq!(cfg.endpoint.max_record_secs, 30.0);
        assert_eq!(cfg.llm.router_mode, RouterMode::Remote);
        assert_eq!(cfg.llm.local.num_predict, 80);
    }

    #[test]
    fn poll_interval_is_clamped_below_one_second() {
        let cfg = PipelineConfig {
            poll_interval_ms: 5_000,
        };
        assert!(cfg.poll_interval() < Duration::from_secs(1));
    }
}
