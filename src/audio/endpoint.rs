//! End-of-speech detection for one recording window.
//!
//! A [`SilenceEndpointer`] is created when the pipeline enters `Listening`
//! and fed every frame until it reports that the utterance is over.  It then
//! hands back either an [`Utterance`] or a "no speech" verdict.
//!
//! ## Algorithm
//!
//! Each frame is classified as speech or silence by an [`ActivityDetector`]
//! working on the frame's RMS level.  Speech frames reset a run-length
//! counter of trailing silence; silence frames extend it.  The utterance ends
//! once speech has been heard *and* the trailing silence covers the
//! configured duration.  Independently, recording stops when the total
//! captured audio reaches the maximum duration.
//!
//! Silence is counted in samples, not frames, so the end is declared within
//! one frame period of the configured duration for any block size and rate.

use crate::audio::frame::AudioFrame;
use crate::config::{EndpointConfig, SilenceMode};

// ---------------------------------------------------------------------------
// ActivityDetector
// ---------------------------------------------------------------------------

/// Smoothing factor for the adaptive noise floor.
const FLOOR_ALPHA: f32 = 0.05;

/// Per-frame speech/silence classifier.
#[derive(Debug, Clone)]
pub enum ActivityDetector {
    /// Speech when the RMS level exceeds a fixed threshold.
    Energy { threshold: f32 },
    /// Speech when the level exceeds both the base threshold and
    /// `ratio` times the running noise floor.
    Adaptive {
        threshold: f32,
        ratio: f32,
        floor: Option<f32>,
    },
}

impl ActivityDetector {
    pub fn from_config(config: &EndpointConfig) -> Self {
        match config.mode {
            SilenceMode::Energy => Self::Energy {
                threshold: config.threshold,
            },
            SilenceMode::Adaptive => Self::Adaptive {
                threshold: config.threshold,
                ratio: config.adaptive_ratio,
                floor: None,
            },
        }
    }

    /// Level a frame currently has to exceed to count as speech.
    pub fn effective_threshold(&self) -> f32 {
        match *self {
            Self::Energy { threshold } => threshold,
            Self::Adaptive {
                threshold,
                ratio,
                floor,
            } => floor.map_or(threshold, |f| threshold.max(f * ratio)),
        }
    }

    /// Classify one frame level.  The adaptive floor only tracks non-speech.
    pub fn is_speech(&mut self, level: f32) -> bool {
        let speech = level > self.effective_threshold();
        if let Self::Adaptive { floor, .. } = self {
            if !speech {
                *floor = Some(match *floor {
                    Some(f) => f * (1.0 - FLOOR_ALPHA) + level * FLOOR_ALPHA,
                    None => level,
                });
            }
        }
        speech
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// What [`SilenceEndpointer::push`] concluded after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Keep feeding frames.
    Continue,
    /// Speech was heard and the trailing silence reached its duration.
    SpeechEnded,
    /// The maximum recording length was reached.
    MaxDuration,
}

impl EndpointStatus {
    pub fn is_done(self) -> bool {
        self != Self::Continue
    }
}

/// Audio collected during one `Listening` episode that contained speech.
#[derive(Debug, Clone)]
pub struct Utterance {
    samples: Vec<f32>,
    sample_rate: u32,
    frame_seqs: Vec<u64>,
}

impl Utterance {
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Sequence numbers of the frames that make up this utterance.
    pub fn frame_seqs(&self) -> &[u64] {
        &self.frame_seqs
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Why a recording window produced nothing to transcribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoSpeechReason {
    /// No frame rose above the speech threshold.
    Silent,
    /// Speech was heard but fewer than the minimum number of frames arrived.
    TooShort,
}

/// Final verdict for a recording window.
#[derive(Debug, Clone)]
pub enum UtteranceOutcome {
    Speech(Utterance),
    NoSpeech(NoSpeechReason),
}

// ---------------------------------------------------------------------------
// SilenceEndpointer
// ---------------------------------------------------------------------------

/// Accumulates frames and decides when the speaker has stopped.
#[derive(Debug)]
pub struct SilenceEndpointer {
    detector: ActivityDetector,
    silence_secs: f32,
    max_secs: f32,
    min_frames: usize,

    samples: Vec<f32>,
    frame_seqs: Vec<u64>,
    sample_rate: u32,
    speech_heard: bool,
    trailing_silence: usize,
}

impl SilenceEndpointer {
    pub fn new(config: &EndpointConfig) -> Self {
        Self {
            detector: ActivityDetector::from_config(config),
            silence_secs: config.silence_secs.max(0.0),
            max_secs: config.max_record_secs.max(0.0),
            min_frames: config.min_frames,
            samples: Vec::new(),
            frame_seqs: Vec::new(),
            sample_rate: 0,
            speech_heard: false,
            trailing_silence: 0,
        }
    }

    /// Add one frame to the recording and report whether to stop.
    pub fn push(&mut self, frame: &AudioFrame) -> EndpointStatus {
        if self.sample_rate == 0 {
            self.sample_rate = frame.sample_rate();
        }
        self.samples.extend_from_slice(frame.samples());
        self.frame_seqs.push(frame.seq());

        if self.detector.is_speech(frame.rms()) {
            self.speech_heard = true;
            self.trailing_silence = 0;
        } else {
            self.trailing_silence += frame.len();
        }

        if self.speech_heard && self.trailing_silence >= self.silence_samples() {
            return EndpointStatus::SpeechEnded;
        }
        if self.samples.len() >= self.max_samples() {
            return EndpointStatus::MaxDuration;
        }
        EndpointStatus::Continue
    }

    pub fn speech_heard(&self) -> bool {
        self.speech_heard
    }

    pub fn frame_count(&self) -> usize {
        self.frame_seqs.len()
    }

    /// Seconds of audio collected so far.
    pub fn recorded_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Close the window and classify what was recorded.
    pub fn finish(self) -> UtteranceOutcome {
        if !self.speech_heard {
            return UtteranceOutcome::NoSpeech(NoSpeechReason::Silent);
        }
        if self.frame_seqs.len() < self.min_frames {
            return UtteranceOutcome::NoSpeech(NoSpeechReason::TooShort);
        }
        UtteranceOutcome::Speech(Utterance {
            samples: self.samples,
            sample_rate: self.sample_rate,
            frame_seqs: self.frame_seqs,
        })
    }

    fn silence_samples(&self) -> usize {
        ((self.silence_secs * self.sample_rate as f32).ceil() as usize).max(1)
    }

    fn max_samples(&self) -> usize {
        ((self.max_secs * self.sample_rate as f32).ceil() as usize).max(1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
