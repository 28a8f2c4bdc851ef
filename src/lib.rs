//! Hands-free voice assistant.
//!
//! Wake word → recorded utterance → Whisper transcript → streamed reply from
//! a local or remote language model → sentence-by-sentence speech, with the
//! microphone ignored while the assistant is busy or talking.

pub mod audio;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod stt;
pub mod tts;
pub mod wake;
