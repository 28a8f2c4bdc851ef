//! Fixed-size mono audio frames.
//!
//! Capture hardware delivers buffers of whatever size the driver picks.  The
//! rest of the system wants fixed-length blocks at a known rate, tagged with a
//! sequence number so ordering can be checked.  [`FrameAssembler`] does the
//! re-blocking; [`AudioFrame`] is the immutable result.

use std::sync::Arc;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// One fixed-length block of mono `f32` samples.
///
/// Samples are held behind an `Arc` so a frame can be cloned cheaply, but the
/// buffer itself is never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    seq: u64,
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(seq: u64, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            seq,
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Capture-order sequence number, starting at 0.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frame duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Root-mean-square level of the frame.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Root-mean-square of `samples`; `0.0` for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

// ---------------------------------------------------------------------------
// FrameAssembler
// ---------------------------------------------------------------------------

/// Re-blocks an arbitrary stream of mono samples into [`AudioFrame`]s of
/// exactly `block_size` samples.
///
/// Leftover samples are carried over to the next [`push`](Self::push).
#[derive(Debug)]
pub struct FrameAssembler {
    block_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    next_seq: u64,
}

impl FrameAssembler {
    /// `block_size` is clamped to at least one sample.
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            sample_rate,
            pending: Vec::with_capacity(block_size * 2),
            next_seq: 0,
        }
    }

    /// Append samples and return every complete frame now available.
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let complete = self.pending.len() / self.block_size;
        let mut frames = Vec::with_capacity(complete);
        for block in self.pending.chunks_exact(self.block_size) {
            frames.push(AudioFrame::new(self.next_seq, block.to_vec(), self.sample_rate));
            self.next_seq += 1;
        }
        self.pending.drain(..complete * self.block_size);
        frames
    }

    /// Samples waiting for the next full frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number the next frame will carry.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_constant_signal() {
        assert!((rms(&[0.5; 100]) - 0.5).abs() < 1e-6);
        assert!((rms(&[-0.5; 100]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn frame_duration() {
        let frame = AudioFrame::new(0, vec![0.0; 1_280], 16_000);
        assert!((frame.duration_secs() - 0.08).abs() < 1e-6);
        assert_eq!(frame.len(), 1_280);
    }

    #[test]
    fn assembler_carries_leftovers() {
        let mut asm = FrameAssembler::new(4, 16_000);

        assert!(asm.push(&[1.0, 2.0, 3.0]).is_empty());
        assert_eq!(asm.pending_len(), 3);

        let frames = asm.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(frames[1].samples(), &[5.0, 6.0, 7.0, 8.0]);
        assert_eq!(asm.pending_len(), 1);
    }

    #[test]
    fn assembler_sequence_numbers_are_monotonic() {
        let mut asm = FrameAssembler::new(2, 16_000);
        let mut seqs = Vec::new();
        for _ in 0..5 {
            seqs.extend(asm.push(&[0.0; 3]).iter().map(AudioFrame::seq));
        }
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(asm.next_seq(), 7);
    }
}
