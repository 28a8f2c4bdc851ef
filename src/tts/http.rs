//! OpenAI-compatible `/v1/audio/speech` client.
//!
//! Works with any server that speaks the OpenAI speech wire format and can
//! return raw PCM, e.g. a local Kokoro server.  The body is signed 16-bit
//! little-endian mono at the configured playback rate.

use std::io::Read;
use std::time::{Duration, Instant};

use crate::config::TtsConfig;
use crate::tts::engine::{SpeechAudio, SynthesisError, Synthesizer, TimedSpeech};

/// Read size when streaming the response body.
const READ_CHUNK: usize = 4_096;

/// Synthesizes speech over HTTP with a blocking `reqwest` client.
pub struct HttpSpeechEngine {
    client: reqwest::blocking::Client,
    config: TtsConfig,
    sample_rate: u32,
}

impl std::fmt::Debug for HttpSpeechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSpeechEngine")
            .field("base_url", &self.config.base_url)
            .field("voice", &self.config.voice)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl HttpSpeechEngine {
    /// `sample_rate` is the rate the server produces and the player expects.
    pub fn from_config(config: &TtsConfig, sample_rate: u32) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            config: config.clone(),
            sample_rate,
        }
    }

    /// Synthesize a short phrase so the server loads its model before the
    /// first real request.
    pub fn warm_up(&self) -> Result<Duration, SynthesisError> {
        let timed = self.synthesize_timed("Hello.")?;
        log::info!("speech engine warm ({:.0} ms)", timed.total.as_secs_f64() * 1_000.0);
        Ok(timed.total)
    }

    fn request(&self, text: &str) -> Result<reqwest::blocking::Response, SynthesisError> {
        let url = format!("{}/v1/audio/speech", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model":           self.config.model,
            "input":           text,
            "voice":           self.config.voice,
            "response_format": "pcm",
            "speed":           self.config.speed,
        });

        let response = self.client.post(&url).json(&body).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

impl Synthesizer for HttpSpeechEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&self, text: &str) -> Result<SpeechAudio, SynthesisError> {
        self.synthesize_timed(text).map(|t| t.audio)
    }

    fn synthesize_timed(&self, text: &str) -> Result<TimedSpeech, SynthesisError> {
        let start = Instant::now();
        let mut response = self.request(text)?;

        let mut decoder = PcmDecoder::default();
        let mut first_chunk = None;
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = response.read(&mut buf)?;
            if n == 0 {
                break;
            }
            first_chunk.get_or_insert_with(|| start.elapsed());
            decoder.push(&buf[..n]);
        }

        let samples = decoder.finish();
        if samples.is_empty() {
            return Err(SynthesisError::EmptyAudio(text.to_string()));
        }

        let total = start.elapsed();
        Ok(TimedSpeech {
            audio: SpeechAudio::new(samples, self.sample_rate),
            first_chunk: first_chunk.unwrap_or(total),
            total,
        })
    }
}

// ---------------------------------------------------------------------------
// PcmDecoder
// ---------------------------------------------------------------------------

/// Incremental s16le → f32 decoder that tolerates odd-length reads.
#[derive(Debug, Default)]
struct PcmDecoder {
    samples: Vec<f32>,
    carry: Option<u8>,
}

impl PcmDecoder {
    fn push(&mut self, mut bytes: &[u8]) {
        if let Some(lo) = self.carry.take() {
            match bytes.split_first() {
                Some((&hi, rest)) => {
                    self.samples.push(i16::from_le_bytes([lo, hi]) as f32 / 32_768.0);
                    bytes = rest;
                }
                None => {
                    self.carry = Some(lo);
                    return;
                }
            }
        }

        let mut pairs = bytes.chunks_exact(2);
        self.samples.extend(
            pairs
                .by_ref()
                .map(|p| i16::from_le_bytes([p[0], p[1]]) as f32 / 32_768.0),
        );
        self.carry = pairs.remainder().first().copied();
    }

    /// A trailing odd byte is discarded.
    fn finish(self) -> Vec<f32> {
        self.samples
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
