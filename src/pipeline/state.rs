//! Pipeline state and the events observers receive.

use std::fmt;

use crate::pipeline::metrics::InteractionMetrics;

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// States of the voice loop.
///
/// The state machine transitions are:
///
/// ```text
/// Idle ──wake──▶ Listening ──speech ended──▶ Processing ──playback started──▶ Speaking
///  ▲                 │                           │                              │
///  └───no speech─────┘                           └────────error────────┐        │
///  └─────────────────────────────── done (wake mode) ◀─────────────────┴────────┘
///
/// always-listening mode: every "back to Idle" edge goes to Listening instead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// Frames go to the wake gate only.
    #[default]
    Idle,
    /// Frames go to the endpointer only.
    Listening,
    /// Microphone ignored; transcription and generation in flight.
    Processing,
    /// Microphone ignored; audio is playing.
    Speaking,
}

impl PipelineState {
    /// `true` while captured audio must not be consumed by anyone.
    pub fn is_microphone_muted(self) -> bool {
        matches!(self, Self::Processing | Self::Speaking)
    }

    /// A short human-readable label for logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

/// Notifications emitted by the state machine for observers and tests.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    /// A recording window closed without usable speech.
    NoSpeech,
    InteractionCompleted(InteractionMetrics),
    /// An interaction failed and was abandoned; the loop carries on.
    InteractionFailed(String),
}
