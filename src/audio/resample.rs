//! Channel mixing and sample-rate conversion.
//!
//! Capture devices run at whatever rate and channel count they prefer
//! (commonly 44.1 or 48 kHz stereo).  Transcription and wake scoring want
//! **16 kHz mono**.  The conversion is two steps:
//!
//! 1. [`stereo_to_mono`] — downmix interleaved channels by averaging.
//! 2. [`StreamResampler`] — continuous rubato FFT resampling that keeps its
//!    filter state across driver buffers, so block boundaries do not click.

use rubato::{FftFixedIn, Resampler};

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// StreamResampler
// ---------------------------------------------------------------------------

/// Errors raised while building the resampler.
#[derive(Debug, thiserror::Error)]
#[error("resampler init failed ({from} Hz -> {to} Hz): {reason}")]
pub struct ResamplerInitError {
    pub from: u32,
    pub to: u32,
    pub reason: String,
}

/// Number of input frames rubato consumes per `process` call.
const CHUNK_SIZE: usize = 1_024;

/// Streaming mono resampler.
///
/// Input of any length is buffered until rubato's fixed input chunk is
/// available, so the output lags the input by at most one chunk.  When the
/// rates match, samples pass straight through.
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("passthrough", &self.inner.is_none())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self, ResamplerInitError> {
        if from_rate == to_rate {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        let inner = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
            .map_err(|e| ResamplerInitError {
                from: from_rate,
                to: to_rate,
                reason: e.to_string(),
            })?;

        Ok(Self {
            inner: Some(inner),
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Feed mono samples; returns whatever converted output is ready.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut output = Vec::new();

        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut out) => {
                    if let Some(channel) = out.pop() {
                        output.extend(channel);
                    }
                }
                Err(e) => {
                    log::warn!("resampling failed, dropping {needed} samples: {e}");
                }
            }
        }

        output
    }

    /// Convert whatever is still buffered, padding the last chunk with
    /// silence and trimming the padding back off the output.
    pub fn flush(&mut self) -> Vec<f32> {
        let mut output = self.process(&[]);
        let Some(resampler) = self.inner.as_mut() else {
            return output;
        };
        if self.pending.is_empty() {
            return output;
        }

        let real = self.pending.len();
        let needed = resampler.input_frames_next();
        let mut chunk = std::mem::take(&mut self.pending);
        chunk.resize(needed.max(real), 0.0);
        match resampler.process(&[chunk], None) {
            Ok(mut out) => {
                if let Some(mut channel) = out.pop() {
                    let keep = (channel.len() as f64 * real as f64 / needed as f64).round() as usize;
                    channel.truncate(keep);
                    output.extend(channel);
                }
            }
            Err(e) => log::warn!("resampling failed, dropping {real} buffered samples: {e}"),
        }
        output
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- stereo_to_mono ----------------------------------------------------

    #[test]
    fn stereo_to_mono_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(stereo_to_mono(&input, 1), input);
    }

    #[test]
    fn stereo_to_mono_two_channel() {
        let out = stereo_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn stereo_to_mono_zero_channels() {
        assert!(stereo_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    // ---- StreamResampler ---------------------------------------------------

    #[test]
    fn same_rate_is_passthrough() {
        let mut rs = StreamResampler::new(16_000, 16_000).unwrap();
        assert!(rs.is_passthrough());
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        assert_eq!(rs.process(&input), input);
    }

    #[test]
    fn short_input_is_buffered_until_a_chunk_is_ready() {
        let mut rs = StreamResampler::new(48_000, 16_000).unwrap();
        assert!(!rs.is_passthrough());
        assert!(rs.process(&[0.0; 100]).is_empty());
    }

    #[test]
    fn flush_converts_the_buffered_tail() {
        let mut rs = StreamResampler::new(48_000, 16_000).unwrap();
        let mut produced = rs.process(&[0.25; 4_800]).len();
        produced += rs.flush().len();
        assert!(
            (produced as i64 - 1_600).abs() <= 2,
            "expected ~1600, got {produced}"
        );
        assert!(rs.flush().is_empty());
    }

    #[test]
    fn downsampling_48k_yields_about_a_third() {
        let mut rs = StreamResampler::new(48_000, 16_000).unwrap();
        let mut produced = 0;
        // One second of input delivered in driver-sized pieces.
        for _ in 0..100 {
            produced += rs.process(&[0.25; 480]).len();
        }
        // Output lags by at most one input chunk.
        let expected = 16_000usize;
        let lag = CHUNK_SIZE / 2;
        assert!(
            produced <= expected && produced + lag >= expected,
            "expected ~{expected}, got {produced}"
        );
    }
}
