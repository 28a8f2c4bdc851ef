//! Speaker output.
//!
//! [`AudioSink`] is the narrow contract the playback worker uses: play one
//! buffer to completion, or stop early when cancelled.  [`CpalPlayer`] is
//! the hardware implementation on the default output device.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::tts::SpeechAudio;

/// How often a blocking `play` checks for completion and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Extra time allowed past the nominal buffer length before giving up.
const COMPLETION_SLACK: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no output device available")]
    NoDevice,

    #[error("no output config supports {0} Hz")]
    UnsupportedRate(u32),

    #[error("buffer is {got} Hz but the output runs at {expected} Hz")]
    RateMismatch { expected: u32, got: u32 },

    #[error("failed to query output configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AudioSink
// ---------------------------------------------------------------------------

/// Something that can play a synthesized buffer.
///
/// `play` blocks until the buffer has finished or `cancel` fires.  A
/// cancelled call returns `Ok(())` after silencing output.
pub trait AudioSink: Send + Sync {
    fn play(&self, audio: &SpeechAudio, cancel: &CancellationToken) -> Result<(), PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalPlayer
// ---------------------------------------------------------------------------

/// Plays mono buffers on the default output device at a fixed rate.
///
/// A fresh stream is built for every buffer and dropped when it ends, so
/// the device is only held while audio is actually playing.
#[derive(Debug, Clone)]
pub struct CpalPlayer {
    config: StreamConfig,
    sample_rate: u32,
}

impl CpalPlayer {
    /// Find an output config at `sample_rate`, preferring mono over stereo.
    pub fn open(sample_rate: u32) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;

        let rate = SampleRate(sample_rate);
        let fits = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        };

        let supported = match device.supported_output_configs()?.find(|c| fits(c, 1)) {
            Some(c) => c,
            None => device
                .supported_output_configs()?
                .find(|c| fits(c, 2))
                .ok_or(PlaybackError::UnsupportedRate(sample_rate))?,
        };

        let config = supported.with_sample_rate(rate).config();

        log::info!(
            "output device: {} ({sample_rate} Hz, {} ch)",
            device.name().unwrap_or_else(|_| "unknown".into()),
            config.channels
        );

        Ok(Self {
            config,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl AudioSink for CpalPlayer {
    fn play(&self, audio: &SpeechAudio, cancel: &CancellationToken) -> Result<(), PlaybackError> {
        if audio.sample_rate != self.sample_rate {
            return Err(PlaybackError::RateMismatch {
                expected: self.sample_rate,
                got: audio.sample_rate,
            });
        }
        if audio.samples.is_empty() {
            return Ok(());
        }

        let device = cpal::default_host()
            .default_output_device()
            .ok_or(PlaybackError::NoDevice)?;

        let channels = self.config.channels.max(1) as usize;
        let samples: Arc<[f32]> = audio.samples.as_slice().into();
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device.build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = match samples.get(pos) {
                            Some(&s) => {
                                pos += 1;
                                s
                            }
                            None => {
                                finished.store(true, Ordering::Release);
                                0.0
                            }
                        };
                        frame.fill(sample);
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| log::error!("audio playback error: {err}"),
                None,
            )?
        };

        stream.play()?;

        let nominal = Duration::from_secs_f64(samples.len() as f64 / self.sample_rate as f64);
        let started = Instant::now();
        while !finished.load(Ordering::Acquire) {
            if cancel.is_cancelled() {
                log::debug!("playback cancelled mid-buffer");
                break;
            }
            if started.elapsed() > nominal + COMPLETION_SLACK {
                log::warn!("playback did not report completion; stopping stream");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        drop(stream);
        log::trace!("played {} samples", samples.len());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
