//! Transcription parameter and result types.
//!
//! [`TranscribeParams`] is the decoding setup handed to [`WhisperEngine`];
//! it is built from the `[stt]` settings section.  [`Transcript`] is what every [`Transcriber`] returns.
//!
//! [`Transcriber`]: crate::stt::Transcriber
//! [`WhisperEngine`]: crate::stt::WhisperEngine

use std::time::Duration;

use crate::config::SttConfig;

// ---------------------------------------------------------------------------
// SamplingStrategy
// ---------------------------------------------------------------------------

/// Decoder search mode, independent of the whisper-rs type so params can
/// be cloned and compared.
///
/// Greedy decoding is the right choice for a conversational loop; beam
/// search costs 2-4× the latency for a small accuracy gain.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingStrategy {
    Greedy {
        /// Candidates per step.
        best_of: i32,
    },
    BeamSearch {
        beam_size: i32,
        patience: f32,
    },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 1 }
    }
}

// ---------------------------------------------------------------------------
// TranscribeParams
// ---------------------------------------------------------------------------

/// Decoding setup shared by every transcription call.
#[derive(Debug, Clone)]
pub struct TranscribeParams {
    /// ISO-639-1 language code, or `"auto"` to let Whisper detect it.
    pub language: String,
    pub strategy: SamplingStrategy,
    /// Number of CPU threads handed to Whisper.
    pub n_threads: i32,
    /// Keep whisper.cpp quiet on stderr.
    pub suppress_progress: bool,
    /// Decode each utterance independently of the previous one.
    pub no_context: bool,
    /// Force a single output segment; utterances are short.
    pub single_segment: bool,
}

impl Default for TranscribeParams {
    fn default() -> Self {
        Self {
            language: "en".into(),
            strategy: SamplingStrategy::default(),
            n_threads: optimal_threads(),
            suppress_progress: true,
            no_context: true,
            single_segment: true,
        }
    }
}

impl TranscribeParams {
    pub fn from_config(config: &SttConfig) -> Self {
        Self {
            language: config.language.clone(),
            n_threads: config.threads.unwrap_or_else(optimal_threads),
            ..Self::default()
        }
    }
}

/// Available cores, capped at 8.
pub(crate) fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Text recognised in one buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Transcript text, trimmed of surrounding whitespace.
    pub text: String,
    /// Wall-clock time the engine took.
    pub latency: Duration,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
