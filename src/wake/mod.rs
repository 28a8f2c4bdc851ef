//! Wake-word detection.
//!
//! * [`WakeScorer`] — per-frame confidence model contract.
//! * [`WakeGate`] — threshold, cooldown and pause/resume around a scorer.
//! * [`TranscriptWakeScorer`] — scorer built on the shared STT engine.

pub mod gate;
pub mod scorer;
pub mod transcript;

pub use gate::{GateStatus, WakeGate};
pub use scorer::{WakeEngineError, WakeScorer, WakeScores};
pub use transcript::TranscriptWakeScorer;
