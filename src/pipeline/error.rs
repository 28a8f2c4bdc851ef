//! Errors surfaced by the voice loop.
//!
//! [`InteractionError`] covers one wake-to-reply cycle and is always
//! recovered from: the loop logs it and returns to rest.  [`PipelineError`]
//! ends the loop.

use thiserror::Error;

use crate::audio::{AudioFileError, CaptureError};
use crate::llm::GenerationError;
use crate::stt::TranscriptionError;
use crate::tts::SynthesisError;
use crate::wake::WakeEngineError;

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("transcription failed: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("could not load recording: {0}")]
    AudioFile(#[from] AudioFileError),

    #[error("wake detection failed: {0}")]
    Wake(#[from] WakeEngineError),

    #[error("could not start worker thread: {0}")]
    Worker(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audio capture failed: {0}")]
    Capture(#[from] CaptureError),
}
