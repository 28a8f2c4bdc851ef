//! Microphone capture via `cpal`.
//!
//! [`AudioCapture`] wraps the cpal host/device/stream lifecycle.  Call
//! [`AudioCapture::start`] to begin delivering 16 kHz mono [`AudioFrame`]s
//! over a bounded channel.  The returned [`CaptureHandle`] is a RAII guard;
//! dropping it stops the cpal stream and joins the conditioning thread, so
//! the device is released on every exit path.
//!
//! ```text
//! cpal callback ──AudioChunk──▶ conditioning thread ──AudioFrame──▶ consumer
//!   (driver rate,               downmix → resample → re-block      (bounded,
//!    N channels)                                                     try_send)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::audio::frame::{AudioFrame, FrameAssembler};
use crate::audio::resample::{stereo_to_mono, ResamplerInitError, StreamResampler};
use crate::config::AudioConfig;

// ---------------------------------------------------------------------------
// AudioChunk
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved PCM samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate of this chunk in Hz (e.g. 44100, 48000, 16000).
    pub sample_rate: u32,
    /// Number of interleaved channels (1 = mono, 2 = stereo, …).
    pub channels: u16,
}

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running the audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    Resampler(#[from] ResamplerInitError),

    #[error("failed to spawn conditioning thread: {0}")]
    Thread(#[from] std::io::Error),

    /// The frame source went away while the pipeline was still running.
    #[error("audio capture disconnected")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// FrameConditioner
// ---------------------------------------------------------------------------

/// Turns raw driver chunks into fixed-size mono frames at the target rate.
#[derive(Debug)]
pub struct FrameConditioner {
    channels: u16,
    resampler: StreamResampler,
    assembler: FrameAssembler,
}

impl FrameConditioner {
    pub fn new(
        device_rate: u32,
        channels: u16,
        target_rate: u32,
        block_size: usize,
    ) -> Result<Self, ResamplerInitError> {
        Ok(Self {
            channels,
            resampler: StreamResampler::new(device_rate, target_rate)?,
            assembler: FrameAssembler::new(block_size, target_rate),
        })
    }

    pub fn condition(&mut self, chunk: &AudioChunk) -> Vec<AudioFrame> {
        let mono = stereo_to_mono(&chunk.samples, self.channels);
        let resampled = self.resampler.process(&mono);
        self.assembler.push(&resampled)
    }
}

/// Forward frames without blocking; a full queue drops the frame.
///
/// Returns `false` once the consumer has hung up.
fn deliver(frames: Vec<AudioFrame>, tx: &SyncSender<AudioFrame>, dropped: &AtomicU64) -> bool {
    for frame in frames {
        match tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
    true
}

fn run_conditioning(
    mut conditioner: FrameConditioner,
    chunks: Receiver<AudioChunk>,
    tx: SyncSender<AudioFrame>,
    dropped: Arc<AtomicU64>,
) {
    while let Ok(chunk) = chunks.recv() {
        let frames = conditioner.condition(&chunk);
        if !deliver(frames, &tx, &dropped) {
            log::debug!("frame consumer gone; conditioning thread exiting");
            return;
        }
    }
    log::debug!("capture stream closed; conditioning thread exiting");
}

// ---------------------------------------------------------------------------
// CaptureHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal stream and its conditioning thread alive.
pub struct CaptureHandle {
    stream: Option<cpal::Stream>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl CaptureHandle {
    /// Frames discarded because the consumer's queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        // Dropping the stream drops the callback and its chunk sender, which
        // ends the conditioning loop.
        self.stream.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("audio conditioning thread panicked");
            }
        }
        log::debug!(
            "capture stopped ({} frames dropped while busy)",
            self.dropped_frames()
        );
    }
}

// ---------------------------------------------------------------------------
// AudioCapture
// ---------------------------------------------------------------------------

/// Microphone capture device wrapper built on top of `cpal`.
pub struct AudioCapture {
    device: cpal::Device,
    config: cpal::StreamConfig,
    /// Native sample rate reported by the device (Hz).
    sample_rate: u32,
    /// Number of interleaved channels reported by the device.
    channels: u16,
    target_rate: u32,
    block_size: usize,
}

impl AudioCapture {
    /// Open the system default input device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoDevice`] when no input device is available,
    /// or [`CaptureError::DefaultConfig`] when the device cannot report a
    /// default stream configuration.
    pub fn open(audio: &AudioConfig) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoDevice)?;

        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "input device: {} ({sample_rate} Hz, {channels} ch)",
            device.name().unwrap_or_else(|_| "unknown".into())
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            channels,
            target_rate: audio.capture_sample_rate,
            block_size: audio.block_size,
        })
    }

    /// Start recording and deliver conditioned frames to `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::BuildStream`] or [`CaptureError::PlayStream`]
    /// if the platform rejects the stream configuration.
    pub fn start(&self, tx: SyncSender<AudioFrame>) -> Result<CaptureHandle, CaptureError> {
        let conditioner =
            FrameConditioner::new(self.sample_rate, self.channels, self.target_rate, self.block_size)?;

        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = {
            let dropped = Arc::clone(&dropped);
            std::thread::Builder::new()
                .name("audio-conditioning".into())
                .spawn(move || run_conditioning(conditioner, chunk_rx, tx, dropped))?
        };

        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk = AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                };
                // Ignore send errors; the conditioning thread may have exited.
                let _ = chunk_tx.send(chunk);
            },
            |err: cpal::StreamError| {
                log::error!("cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;

        Ok(CaptureHandle {
            stream: Some(stream),
            worker: Some(worker),
            dropped,
        })
    }

    /// Native sample rate of the capture device in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved channels the device delivers.
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
