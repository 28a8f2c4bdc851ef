//! Wake-word scoring contract.

use std::collections::HashMap;

use thiserror::Error;

use crate::stt::TranscriptionError;

#[derive(Debug, Error)]
pub enum WakeEngineError {
    #[error("wake scorer failed: {0}")]
    Scorer(String),

    #[error("wake transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),
}

/// Per-label confidences in `[0, 1]` for one frame.
pub type WakeScores = HashMap<String, f32>;

/// A wake-word model fed one frame at a time.
///
/// Scores usually depend on a rolling window of recent frames;
/// [`reset`](Self::reset) discards that window.
pub trait WakeScorer: Send {
    fn predict(&mut self, frame: &[f32]) -> Result<WakeScores, WakeEngineError>;

    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// ScriptedScorer  (test-only)
// ---------------------------------------------------------------------------
