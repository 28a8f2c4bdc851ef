//! Audio I/O: microphone frames in, synthesized speech out.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk → conditioning thread
//!           → stereo_to_mono → StreamResampler → FrameAssembler
//!           → AudioFrame (bounded channel) → WakeGate | SilenceEndpointer
//!
//! SpeechAudio → AudioSink (CpalPlayer) → speakers
//! ```
//!
//! Capture runs at 16 kHz and playback at 24 kHz.  The two never meet
//! without an explicit [`StreamResampler`].

pub mod capture;
pub mod endpoint;
pub mod file;
pub mod frame;
pub mod playback;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, CaptureHandle, FrameConditioner};
pub use endpoint::{
    ActivityDetector, EndpointStatus, NoSpeechReason, SilenceEndpointer, Utterance,
    UtteranceOutcome,
};
pub use file::{load_wav, AudioFileError};
pub use frame::{rms, AudioFrame, FrameAssembler};
pub use playback::{AudioSink, CpalPlayer, PlaybackError};
pub use resample::{stereo_to_mono, ResamplerInitError, StreamResampler};
