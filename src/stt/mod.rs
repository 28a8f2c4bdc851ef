//! STT (Speech-to-Text) engine module.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               Transcriber (trait)                    │
//! │                                                      │
//! │   ┌──────────────────┐    ┌──────────────┐          │
//! │   │ TranscribeParams │───▶│ WhisperEngine│          │
//! │   │ - language       │    │ - ctx        │          │
//! │   │ - threads        │    │ - params     │          │
//! │   └──────────────────┘    └──────┬───────┘          │
//! │                                  ▼                   │
//! │                      ┌───────────────────────┐       │
//! │                      │ transcribe()          │       │
//! │                      │ audio → Transcript    │       │
//! │                      └───────────────────────┘       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The same engine instance serves the pipeline and the transcript-based
//! wake scorer through an `Arc<dyn Transcriber>`.

pub mod engine;
pub mod transcribe;

// ── Public re-exports ──────────────────────────────────────────────────────

pub use engine::{Transcriber, TranscriptionError, WhisperEngine};
pub use transcribe::{SamplingStrategy, TranscribeParams, Transcript};

#[cfg(test)]
pub use engine::MockTranscriber;
