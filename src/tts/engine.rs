//! Speech synthesis trait and buffer types.
//!
//! [`Synthesizer`] is the contract the streaming speaker relies on: text in,
//! one complete audio buffer out, at a rate the caller already knows.  It is
//! object-safe and `Send + Sync` so it can sit behind an `Arc<dyn Synthesizer>`.

use std::time::{Duration, Instant};

use thiserror::Error;

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SynthesisError {
    /// HTTP transport or connection error.
    #[error("speech request failed: {0}")]
    Request(String),

    #[error("speech request timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("speech server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read speech body: {0}")]
    Body(#[from] std::io::Error),

    #[error("speech engine returned no audio for {0:?}")]
    EmptyAudio(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthesisError::Timeout
        } else {
            SynthesisError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

/// One synthesized mono buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SpeechAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// A buffer together with how long it took to produce.
#[derive(Debug, Clone)]
pub struct TimedSpeech {
    pub audio: SpeechAudio,
    /// Time until the engine produced its first bytes of audio.
    pub first_chunk: Duration,
    /// Time until the full buffer was available.
    pub total: Duration,
}

// ---------------------------------------------------------------------------
// Synthesizer trait
// ---------------------------------------------------------------------------

pub trait Synthesizer: Send + Sync {
    /// Output rate of every buffer this engine returns.
    fn sample_rate(&self) -> u32;

    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError>;

    /// Like [`synthesize`](Self::synthesize) but with latency figures.
    ///
    /// Engines that cannot observe their first chunk report it equal to the
    /// total.
    fn synthesize_timed(&self, text: &str) -> Result<TimedSpeech, SynthesisError> {
        let start = Instant::now();
        let audio = self.synthesize(text)?;
        let total = start.elapsed();
        Ok(TimedSpeech {
            audio,
            first_chunk: total,
            total,
        })
    }
}

// Compile-time assertion: Box<dyn Synthesizer> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Synthesizer>) {}
};

// ---------------------------------------------------------------------------
// MockSynthesizer  (test-only)
// ---------------------------------------------------------------------------

/// Test double: one sample per character, optional per-text delay, and a
/// log of every text it was asked to speak.
#[cfg(test)]
#[derive(Default)]
pub struct MockSynthesizer {
    pub calls: std::sync::Mutex<Vec<String>>,
    /// When each call started, by text.
    pub call_times: std::sync::Mutex<Vec<(String, Instant)>>,
    /// Texts that should take this long to synthesize.
    pub delays: Vec<(String, Duration)>,
    /// Texts that should fail.
    pub failures: Vec<String>,
}

#[cfg(test)]
impl MockSynthesizer {
    pub const RATE: u32 = 24_000;

    pub fn with_delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.push((text.to_string(), delay));
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failures.push(text.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_started(&self, text: &str) -> Option<Instant> {
        self.call_times
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, at)| *at)
    }

    /// Recover the text a mock buffer was made from.
    pub fn decode(audio: &SpeechAudio) -> String {
        audio
            .samples
            .iter()
            .filter_map(|&s| char::from_u32(s as u32))
            .collect()
    }
}

#[cfg(test)]
impl Synthesizer for MockSynthesizer {
    fn sample_rate(&self) -> u32 {
        Self::RATE
    }

    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError> {
        self.calls.lock().unwrap().push(text.to_string());
        self.call_times
            .lock()
            .unwrap()
            .push((text.to_string(), Instant::now()));
        if let Some((_, d)) = self.delays.iter().find(|(t, _)| t == text) {
            std::thread::sleep(*d);
        }
        if self.failures.iter().any(|t| t == text) {
            return Err(SynthesisError::EmptyAudio(text.to_string()));
        }
        let samples = text.chars().map(|c| c as u32 as f32).collect();
        Ok(SpeechAudio::new(samples, Self::RATE))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
