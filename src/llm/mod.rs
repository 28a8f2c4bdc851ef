//! Response generation.
//!
//! This module provides:
//! * [`ResponseGenerator`] — "prompt in, lazy token stream out" contract.
//! * [`OllamaGenerator`] — local backend (Ollama NDJSON streaming).
//! * [`AnthropicGenerator`] — remote backend (Anthropic SSE streaming).
//! * [`classify`] — keyword/length heuristic choosing a [`Backend`].
//! * [`QueryRouter`] — applies the router mode and falls back when the
//!   chosen backend is unavailable.
//! * [`GenerationError`] — error variants for generation.
//!
//! All HTTP traffic uses a blocking `reqwest` client: the speech pipeline
//! pulls tokens from a plain iterator on its own thread.

pub mod anthropic;
pub mod classify;
pub mod generator;
pub mod ollama;
pub mod router;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use anthropic::AnthropicGenerator;
pub use classify::{classify, Backend};
pub use generator::{GenerationError, ResponseGenerator, TokenStream};
pub use ollama::OllamaGenerator;
pub use router::{QueryRouter, RouteExplanation, Routed};

#[cfg(test)]
pub use generator::ScriptedGenerator;
