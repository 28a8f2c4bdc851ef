//! Text-to-speech.
//!
//! * [`Synthesizer`] — the engine contract used by the streaming speaker.
//! * [`HttpSpeechEngine`] — OpenAI-compatible speech endpoint returning PCM.
//! * [`SpeechAudio`] / [`TimedSpeech`] — synthesized buffers.

pub mod engine;
pub mod http;

pub use engine::{SpeechAudio, SynthesisError, Synthesizer, TimedSpeech};
pub use http::HttpSpeechEngine;

#[cfg(test)]
pub use engine::MockSynthesizer;
