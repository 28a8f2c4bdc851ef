//! The voice loop and the streaming speaker.
//!
//! # Architecture
//!
//! ```text
//! AudioFrame (bounded mpsc)
//!        │
//!        ▼
//! PipelineStateMachine::run()  ← blocking, main thread
//!        │
//!        ├─ Idle       → WakeGate::feed ── on_wake ──▶ pause gate
//!        ├─ Listening  → SilenceEndpointer::push
//!        └─ Processing → Transcriber::transcribe
//!                        QueryRouter::route ──▶ TokenStream
//!                        StreamingSynthesizer::speak
//!                          ├─ SentenceChunker   (text → units)
//!                          ├─ Synthesizer       (unit → SpeechAudio)
//!                          └─ "playback" thread (AudioSink, FIFO)  → Speaking
//!
//! PipelineEvent (optional mpsc) ──▶ observers / tests
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::{mpsc, Arc};
//! use tokio_util::sync::CancellationToken;
//! use voice_assistant::config::AppConfig;
//! use voice_assistant::pipeline::{PipelineComponents, PipelineStateMachine};
//! # use voice_assistant::{llm::QueryRouter, pipeline::StreamingSynthesizer, stt::Transcriber};
//! # fn parts() -> (Arc<dyn Transcriber>, QueryRouter, StreamingSynthesizer) { unimplemented!() }
//!
//! let config = AppConfig::default();
//! let (transcriber, router, speaker) = parts();
//! let (_frame_tx, frame_rx) = mpsc::sync_channel(config.audio.frame_queue_capacity);
//!
//! let components = PipelineComponents { transcriber, router, speaker, wake: None };
//! let mut machine =
//!     PipelineStateMachine::new(&config, components, frame_rx, CancellationToken::new());
//! machine.run()?;
//! # Ok::<(), voice_assistant::pipeline::PipelineError>(())
//! ```

pub mod chunker;
pub mod error;
pub mod metrics;
pub mod runner;
pub mod speaker;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use chunker::SentenceChunker;
pub use error::{InteractionError, PipelineError};
pub use metrics::InteractionMetrics;
pub use runner::{PipelineComponents, PipelineStateMachine};
pub use speaker::{SpeakReport, StreamingSynthesizer};
pub use state::{PipelineEvent, PipelineState};
