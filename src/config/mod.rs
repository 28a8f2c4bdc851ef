//! Configuration for the voice assistant.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per component,
//! `AppPaths` for cross-platform data directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.  Components receive their section
//! by value in their constructor; nothing reads process-wide globals.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, AudioConfig, EndpointConfig, LlmConfig, LocalLlmConfig, PipelineConfig,
    RemoteLlmConfig, RouterMode, SilenceMode, SpeechConfig, SttConfig, TtsConfig, WakeConfig,
};
