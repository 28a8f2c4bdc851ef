//! Wake-word gating.
//!
//! [`WakeGate`] sits between the frame stream and a [`WakeScorer`].  While
//! active it scores every frame it is fed and calls the registered `on_wake`
//! callback when the configured label's confidence exceeds the threshold,
//! at most once per cooldown window.  While paused it ignores frames
//! entirely, so the scorer's state is never touched during an interaction.
//!
//! ```text
//!           start(on_wake)        pause()
//! Stopped ───────────────▶ Active ───────▶ Paused
//!    ▲                       ▲               │
//!    │ stop()                └───────────────┘
//!    └──────────────────────  resume() + scorer.reset()
//! ```

use std::time::{Duration, Instant};

use crate::audio::AudioFrame;
use crate::config::WakeConfig;
use crate::wake::scorer::{WakeEngineError, WakeScorer};

/// Minimum spacing between debug score dumps.
const DEBUG_DUMP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Stopped,
    Active,
    Paused,
}

type WakeCallback = Box<dyn FnMut() + Send>;

pub struct WakeGate {
    scorer: Box<dyn WakeScorer>,
    label: String,
    threshold: f32,
    cooldown: Duration,
    debug: bool,

    on_wake: Option<WakeCallback>,
    status: GateStatus,
    last_trigger: Option<Instant>,
    last_dump: Option<Instant>,
}

impl std::fmt::Debug for WakeGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeGate")
            .field("label", &self.label)
            .field("threshold", &self.threshold)
            .field("cooldown", &self.cooldown)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl WakeGate {
    pub fn new(scorer: Box<dyn WakeScorer>, config: &WakeConfig) -> Self {
        Self {
            scorer,
            label: config.label.clone(),
            threshold: config.threshold,
            cooldown: config.cooldown(),
            debug: config.debug,
            on_wake: None,
            status: GateStatus::Stopped,
            last_trigger: None,
            last_dump: None,
        }
    }

    /// Begin scoring frames; `on_wake` fires on each accepted trigger.
    pub fn start(&mut self, on_wake: impl FnMut() + Send + 'static) {
        self.on_wake = Some(Box::new(on_wake));
        self.scorer.reset();
        self.status = GateStatus::Active;
        log::info!(
            "wake gate listening for '{}' (threshold {:.2})",
            self.label,
            self.threshold
        );
    }

    /// Score one frame.  Returns `true` when the callback fired.
    ///
    /// Frames fed while paused or stopped are ignored.
    pub fn feed(&mut self, frame: &AudioFrame) -> Result<bool, WakeEngineError> {
        self.feed_at(frame, Instant::now())
    }

    pub(crate) fn feed_at(&mut self, frame: &AudioFrame, now: Instant) -> Result<bool, WakeEngineError> {
        if self.status != GateStatus::Active {
            return Ok(false);
        }

        let scores = self.scorer.predict(frame.samples())?;
        let score = scores.get(&self.label).copied().unwrap_or(0.0);

        if self.debug && self.last_dump.map_or(true, |t| now.duration_since(t) >= DEBUG_DUMP_INTERVAL) {
            self.last_dump = Some(now);
            log::debug!("wake scores @frame {}: {scores:?}", frame.seq());
        }

        if score <= self.threshold {
            return Ok(false);
        }

        if let Some(last) = self.last_trigger {
            let since = now.duration_since(last);
            if since < self.cooldown {
                if self.debug {
                    log::debug!(
                        "wake trigger suppressed ({score:.2}, {:.2}s into {:.2}s cooldown)",
                        since.as_secs_f32(),
                        self.cooldown.as_secs_f32()
                    );
                }
                return Ok(false);
            }
        }

        self.last_trigger = Some(now);
        log::info!("wake word '{}' detected ({score:.2})", self.label);
        if let Some(cb) = self.on_wake.as_mut() {
            cb();
        }
        Ok(true)
    }

    /// Stop scoring without releasing anything.
    pub fn pause(&mut self) {
        if self.status == GateStatus::Active {
            self.status = GateStatus::Paused;
            log::debug!("wake gate paused");
        }
    }

    /// Resume scoring with a clean scorer window.
    pub fn resume(&mut self) {
        if self.status == GateStatus::Paused {
            self.scorer.reset();
            self.status = GateStatus::Active;
            log::debug!("wake gate resumed");
        }
    }

    /// Drop the callback and stop scoring for good.
    pub fn stop(&mut self) {
        self.on_wake = None;
        self.status = GateStatus::Stopped;
        log::debug!("wake gate stopped");
    }

    pub fn status(&self) -> GateStatus {
        self.status
    }

    pub fn is_paused(&self) -> bool {
        self.status == GateStatus::Paused
    }

    pub fn is_active(&self) -> bool {
        self.status == GateStatus::Active
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
