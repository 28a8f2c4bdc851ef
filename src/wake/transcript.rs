//! Wake scoring by transcribing short speech bursts.
//!
//! [`TranscriptWakeScorer`] needs no dedicated wake model.  It watches frame
//! energy for a burst of speech followed by a short pause, runs the burst
//! through the shared [`Transcriber`], and reports `1.0` for its label when
//! the text contains one of the configured wake phrases.
//!
//! Every frame that is not the end of a burst scores `0.0`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::audio::rms;
use crate::config::WakeConfig;
use crate::stt::Transcriber;
use crate::wake::scorer::{WakeEngineError, WakeScorer, WakeScores};

/// RMS level a frame needs to open or extend a burst.
const BURST_ENERGY: f32 = 0.02;
/// Trailing quiet that closes a burst.
const BURST_END_SECS: f32 = 0.3;
/// Bursts shorter than this are ignored (clicks, coughs).
const MIN_BURST_SECS: f32 = 0.25;

pub struct TranscriptWakeScorer {
    transcriber: Arc<dyn Transcriber>,
    label: String,
    phrases: Vec<String>,

    window: Vec<f32>,
    max_window: usize,
    end_samples: usize,
    min_samples: usize,
    in_burst: bool,
    quiet: usize,
}

impl TranscriptWakeScorer {
    pub fn new(transcriber: Arc<dyn Transcriber>, config: &WakeConfig, sample_rate: u32) -> Self {
        let rate = sample_rate as f32;
        let phrases = config
            .phrases
            .iter()
            .map(|p| normalize(p))
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            transcriber,
            label: config.label.clone(),
            phrases,
            window: Vec::new(),
            max_window: (config.window_secs.max(0.5) * rate) as usize,
            end_samples: (BURST_END_SECS * rate) as usize,
            min_samples: (MIN_BURST_SECS * rate) as usize,
            in_burst: false,
            quiet: 0,
        }
    }

    /// `true` when `text` contains a configured wake phrase.
    pub fn matches(&self, text: &str) -> bool {
        let text = normalize(text);
        self.phrases.iter().any(|p| text.contains(p.as_str()))
    }

    fn score(&self, value: f32) -> WakeScores {
        HashMap::from([(self.label.clone(), value)])
    }
}

impl WakeScorer for TranscriptWakeScorer {
    fn predict(&mut self, frame: &[f32]) -> Result<WakeScores, WakeEngineError> {
        let loud = rms(frame) > BURST_ENERGY;

        if !self.in_burst {
            if !loud {
                return Ok(self.score(0.0));
            }
            self.in_burst = true;
            self.quiet = 0;
            self.window.clear();
        }

        self.window.extend_from_slice(frame);
        if self.window.len() > self.max_window {
            let excess = self.window.len() - self.max_window;
            self.window.drain(..excess);
        }

        if loud {
            self.quiet = 0;
            return Ok(self.score(0.0));
        }

        self.quiet += frame.len();
        if self.quiet < self.end_samples {
            return Ok(self.score(0.0));
        }

        // Burst closed.
        let burst = std::mem::take(&mut self.window);
        self.in_burst = false;
        self.quiet = 0;

        if burst.len() < self.min_samples + self.end_samples {
            return Ok(self.score(0.0));
        }

        let transcript = self.transcriber.transcribe(&burst)?;
        let hit = self.matches(&transcript.text);
        log::debug!("wake burst heard: {:?} (match: {hit})", transcript.text);
        Ok(self.score(if hit { 1.0 } else { 0.0 }))
    }

    fn reset(&mut self) {
        self.window.clear();
        self.in_burst = false;
        self.quiet = 0;
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
