//! Core transcription trait and the Whisper implementation.
//!
//! # Overview
//!
//! [`Transcriber`] is the interface used by the pipeline and the wake
//! scorer.  It is object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn Transcriber>` and shared between them.
//!
//! [`WhisperEngine`] runs a GGML Whisper model through `whisper-rs`; build
//! one with [`WhisperEngine::load`].
//!
//! [`MockTranscriber`] (available under `#[cfg(test)]`) returns scripted
//! responses and records every buffer it was handed.

use std::path::Path;
use std::time::Instant;

use thiserror::Error;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::stt::transcribe::{SamplingStrategy, TranscribeParams, Transcript};

// ---------------------------------------------------------------------------
// TranscriptionError
// ---------------------------------------------------------------------------

/// Speech-to-text failures.
#[derive(Debug, Clone, Error)]
pub enum TranscriptionError {
    /// No model file at the configured location.
    #[error("speech model missing: {0}")]
    ModelNotFound(String),

    /// The model could not be loaded, or a decoding state not created.
    #[error("could not initialise whisper: {0}")]
    ContextInit(String),

    #[error("whisper inference failed: {0}")]
    Inference(String),

    /// The supplied audio buffer exceeds 60 s at 16 kHz.
    #[error("Audio too long: maximum 60 s (960 000 samples at 16 kHz)")]
    AudioTooLong,
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Speech-to-text engine contract.
///
/// `audio` is **16 kHz mono f32**.  The returned [`Transcript`] carries the
/// engine's own latency measurement.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &[f32]) -> Result<Transcript, TranscriptionError>;
}

// Compile-time assertion: Box<dyn Transcriber> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

/// Whisper misbehaves on input under one second; shorter clips are padded
/// with trailing silence up to this length.
const MIN_AUDIO_SAMPLES: usize = 16_800;
/// One minute at 16 kHz.  Utterances are capped well below this.
const MAX_AUDIO_SAMPLES: usize = 960_000;

// ---------------------------------------------------------------------------
// WhisperEngine
// ---------------------------------------------------------------------------

/// Whisper-backed [`Transcriber`].
///
/// The context holds the read-only weights; every [`transcribe`] call gets
/// its own decoding state, so the pipeline and the wake scorer can share one
/// engine without a lock.
///
/// [`transcribe`]: Transcriber::transcribe
pub struct WhisperEngine {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperEngine {}
unsafe impl Sync for WhisperEngine {}

impl WhisperEngine {
    /// Load the model at `model_path`.
    ///
    /// # Errors
    ///
    /// - [`TranscriptionError::ModelNotFound`] — `model_path` does not exist.
    /// - [`TranscriptionError::ContextInit`]  — whisper-rs failed to load the file.
    pub fn load(
        model_path: impl AsRef<Path>,
        params: TranscribeParams,
    ) -> Result<Self, TranscriptionError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(TranscriptionError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            TranscriptionError::ModelNotFound(format!(
                "{} (path is not valid UTF-8)",
                path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| TranscriptionError::ContextInit(e.to_string()))?;

        log::info!("whisper model loaded from {}", path.display());
        Ok(Self { ctx, params })
    }

    /// Run one throwaway inference so the first real request is not slow.
    pub fn warm_up(&self) -> Result<(), TranscriptionError> {
        let t = self.transcribe(&[0.0; MIN_AUDIO_SAMPLES])?;
        log::info!("whisper warm ({:.0} ms)", t.latency.as_secs_f64() * 1_000.0);
        Ok(())
    }

    fn full_params(&self) -> FullParams<'_, '_> {
        let strategy = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => whisper_rs::SamplingStrategy::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                whisper_rs::SamplingStrategy::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(strategy);
        let language = self.params.language.as_str();
        fp.set_language((language != "auto").then_some(language));
        fp.set_n_threads(self.params.n_threads);
        fp.set_no_context(self.params.no_context);
        fp.set_single_segment(self.params.single_segment);

        if self.params.suppress_progress {
            fp.set_print_progress(false);
            fp.set_print_realtime(false);
            fp.set_print_special(false);
            fp.set_print_timestamps(false);
        }
        fp
    }
}

impl Transcriber for WhisperEngine {
    fn transcribe(&self, audio: &[f32]) -> Result<Transcript, TranscriptionError> {
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(TranscriptionError::AudioTooLong);
        }

        let padded;
        let audio = if audio.len() < MIN_AUDIO_SAMPLES {
            let mut v = audio.to_vec();
            v.resize(MIN_AUDIO_SAMPLES, 0.0);
            padded = v;
            padded.as_slice()
        } else {
            audio
        };

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscriptionError::ContextInit(e.to_string()))?;

        let start = Instant::now();

        state
            .full(self.full_params(), audio)
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let text = (0..n_segments)
            .map(|i| {
                state
                    .full_get_segment_text(i)
                    .map_err(|e| TranscriptionError::Inference(format!("segment {i}: {e}")))
            })
            .collect::<Result<String, _>>()?;

        Ok(Transcript {
            text: text.trim().to_string(),
            latency: start.elapsed(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// Test double returning scripted transcripts in order (the last one
/// repeats) and remembering every buffer it received.
#[cfg(test)]
pub struct MockTranscriber {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String, TranscriptionError>>>,
    last: std::sync::Mutex<Option<Result<String, TranscriptionError>>>,
    pub received: std::sync::Mutex<Vec<Vec<f32>>>,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self::scripted(vec![Ok(text.into())])
    }

    pub fn err(error: TranscriptionError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    pub fn scripted(responses: Vec<Result<String, TranscriptionError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            last: std::sync::Mutex::new(None),
            received: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: &[f32]) -> Result<Transcript, TranscriptionError> {
        self.received.lock().unwrap().push(audio.to_vec());
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        match last.clone() {
            Some(Ok(text)) => Ok(Transcript {
                text,
                latency: std::time::Duration::from_millis(1),
            }),
            Some(Err(e)) => Err(e),
            None => Ok(Transcript {
                text: String::new(),
                latency: std::time::Duration::ZERO,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_ok_returns_configured_text() {
        let engine = MockTranscriber::ok("what time is it");
        let t = engine.transcribe(&[0.0; 100]).unwrap();
        assert_eq!(t.text, "what time is it");
        assert_eq!(engine.call_count(), 1);
    }

    #[test]
    fn mock_err_returns_configured_error() {
        let engine = MockTranscriber::err(TranscriptionError::Inference("boom".into()));
        let err = engine.transcribe(&[0.0; 100]).unwrap_err();
        assert!(matches!(err, TranscriptionError::Inference(_)));
    }

    #[test]
    fn mock_script_repeats_last_response() {
        let engine = MockTranscriber::scripted(vec![Ok("one".into()), Ok("two".into())]);
        let texts: Vec<String> = (0..3)
            .map(|_| engine.transcribe(&[]).unwrap().text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "two"]);
    }

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperEngine::load("/nonexistent/model.bin", TranscribeParams::default());
        assert!(
            matches!(result, Err(TranscriptionError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    #[test]
    fn box_dyn_transcriber_compiles() {
        let engine: Box<dyn Transcriber> = Box::new(MockTranscriber::ok("ok"));
        let _ = engine.transcribe(&[0.0; 10]);
    }

    #[test]
    fn error_display_names_the_path() {
        let e = TranscriptionError::ModelNotFound("/some/path.bin".into());
        assert!(e.to_string().contains("/some/path.bin"));
    }
}
