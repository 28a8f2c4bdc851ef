//! Streaming speech: token stream in, audio out while the reply is still
//! being generated.
//!
//! ```text
//! caller thread                          "playback" thread
//! ─────────────                          ─────────────────
//! for token in stream
//!   SentenceChunker::push ─▶ unit
//!   Synthesizer::synthesize_timed
//!   send(Audio) ──────────────────────▶  AudioSink::play   (FIFO)
//!   ◀──────────────────────────────────  Started (once)
//! finish() remainder
//! send(EndOfStream) ──────────────────▶  exit loop
//! wait (bounded) ◀────────────────────── Finished(stats)
//! ```
//!
//! Synthesis of unit N+1 overlaps playback of unit N.  Buffers are played
//! strictly in the order their units were produced.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::audio::AudioSink;
use crate::config::SpeechConfig;
use crate::llm::TokenStream;
use crate::pipeline::chunker::SentenceChunker;
use crate::pipeline::error::InteractionError;
use crate::tts::{SpeechAudio, Synthesizer};

/// Longest single wait while the playback queue drains.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// How often the idle playback worker checks for cancellation.
const WORKER_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// SpeakReport
// ---------------------------------------------------------------------------

/// What happened while speaking one reply.  Offsets are measured from the
/// moment the token stream was handed to [`StreamingSynthesizer::speak`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeakReport {
    /// Full reply text as generated.
    pub text: String,
    /// Units sent to synthesis, in order.
    pub units: Vec<String>,
    pub token_count: usize,
    pub first_token: Option<Duration>,
    /// When the first buffer was queued for playback.
    pub first_audio: Option<Duration>,
    /// Engine latency to the first bytes of the first unit's audio.
    pub first_chunk: Option<Duration>,
    pub generation_total: Duration,
    pub synthesis_total: Duration,
    pub playback_total: Duration,
    pub buffers_played: usize,
}

// ---------------------------------------------------------------------------
// Playback worker
// ---------------------------------------------------------------------------

enum PlaybackItem {
    Audio(SpeechAudio),
    EndOfStream,
}

#[derive(Debug, Default)]
struct PlaybackStats {
    played: usize,
    total: Duration,
}

enum WorkerEvent {
    /// The first buffer is about to play.
    Started,
    Finished(PlaybackStats),
}

fn run_playback(
    sink: Arc<dyn AudioSink>,
    items: Receiver<PlaybackItem>,
    events: Sender<WorkerEvent>,
    cancel: CancellationToken,
) {
    let mut stats = PlaybackStats::default();
    let mut announced = false;

    while !cancel.is_cancelled() {
        let audio = match items.recv_timeout(WORKER_POLL) {
            Ok(PlaybackItem::Audio(audio)) => audio,
            Ok(PlaybackItem::EndOfStream) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => continue,
        };

        if !announced {
            announced = true;
            let _ = events.send(WorkerEvent::Started);
        }

        let started = Instant::now();
        match sink.play(&audio, &cancel) {
            Ok(()) => stats.played += 1,
            Err(e) => log::error!("playback failed, skipping buffer: {e}"),
        }
        stats.total += started.elapsed();
    }

    let _ = events.send(WorkerEvent::Finished(stats));
}

// ---------------------------------------------------------------------------
// StreamingSynthesizer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct StreamingSynthesizer {
    engine: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    config: SpeechConfig,
}

impl std::fmt::Debug for StreamingSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSynthesizer")
            .field("sample_rate", &self.engine.sample_rate())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StreamingSynthesizer {
    pub fn new(engine: Arc<dyn Synthesizer>, sink: Arc<dyn AudioSink>, config: SpeechConfig) -> Self {
        Self {
            engine,
            sink,
            config,
        }
    }

    /// Speak a reply as it is generated.
    ///
    /// `on_speaking` fires once, just before the first buffer plays.  The
    /// call returns after every queued buffer has played, the drain timeout
    /// has passed, or `cancel` fired.  On a generation or synthesis error,
    /// audio already queued still plays before the error is returned.
    pub fn speak(
        &self,
        tokens: TokenStream,
        cancel: &CancellationToken,
        on_speaking: &mut dyn FnMut(),
    ) -> Result<SpeakReport, InteractionError> {
        let (item_tx, item_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let worker_cancel = cancel.child_token();

        let worker = {
            let sink = Arc::clone(&self.sink);
            let token = worker_cancel.clone();
            std::thread::Builder::new()
                .name("playback".into())
                .spawn(move || run_playback(sink, item_rx, event_tx, token))
                .map_err(InteractionError::Worker)?
        };

        let started = Instant::now();
        let mut chunker = SentenceChunker::new(&self.config);
        let mut report = SpeakReport::default();
        let mut speaking = false;
        let mut finished_early = None;
        let mut outcome: Result<(), InteractionError> = Ok(());

        for token in tokens {
            if cancel.is_cancelled() {
                break;
            }
            let token = match token {
                Ok(t) => t,
                Err(e) => {
                    outcome = Err(e.into());
                    break;
                }
            };

            report.token_count += 1;
            report.first_token.get_or_insert_with(|| started.elapsed());
            report.text.push_str(&token);

            if let Some(unit) = chunker.push(&token) {
                // Synthesis can block for a while; announce audio that is
                // already playing first.
                poll_worker(&event_rx, &mut speaking, on_speaking, &mut finished_early);
                if let Err(e) = self.synthesize_unit(unit, started, &mut report, &item_tx) {
                    outcome = Err(e);
                    break;
                }
            }

            poll_worker(&event_rx, &mut speaking, on_speaking, &mut finished_early);
        }
        report.generation_total = started.elapsed();

        if outcome.is_ok() && !cancel.is_cancelled() {
            if let Some(unit) = chunker.finish() {
                poll_worker(&event_rx, &mut speaking, on_speaking, &mut finished_early);
                outcome = self.synthesize_unit(unit, started, &mut report, &item_tx);
            }
        }

        let _ = item_tx.send(PlaybackItem::EndOfStream);
        let stats = match finished_early {
            Some(stats) => Some(stats),
            None => self.drain(&event_rx, cancel, &worker_cancel, &mut speaking, on_speaking),
        };
        join_worker(worker);

        let stats = stats.or_else(|| {
            event_rx.try_iter().find_map(|event| match event {
                WorkerEvent::Finished(stats) => Some(stats),
                WorkerEvent::Started => None,
            })
        });
        if let Some(stats) = stats {
            report.buffers_played = stats.played;
            report.playback_total = stats.total;
        }

        outcome.map(|()| report)
    }

    fn synthesize_unit(
        &self,
        unit: String,
        started: Instant,
        report: &mut SpeakReport,
        queue: &Sender<PlaybackItem>,
    ) -> Result<(), InteractionError> {
        log::debug!("synthesizing: {unit:?}");
        let timed = self.engine.synthesize_timed(&unit)?;

        report.synthesis_total += timed.total;
        report.first_chunk.get_or_insert(timed.first_chunk);
        report.units.push(unit);

        report.first_audio.get_or_insert_with(|| started.elapsed());
        if queue.send(PlaybackItem::Audio(timed.audio)).is_err() {
            log::warn!("playback worker gone; dropping synthesized audio");
        }
        Ok(())
    }

    /// Wait for the worker to report it has finished, giving up when the
    /// drain timeout passes or the caller cancels.
    fn drain(
        &self,
        events: &Receiver<WorkerEvent>,
        cancel: &CancellationToken,
        worker_cancel: &CancellationToken,
        speaking: &mut bool,
        on_speaking: &mut dyn FnMut(),
    ) -> Option<PlaybackStats> {
        let deadline = Instant::now() + self.config.drain_timeout();
        loop {
            match events.recv_timeout(DRAIN_POLL) {
                Ok(WorkerEvent::Started) => announce(speaking, on_speaking),
                Ok(WorkerEvent::Finished(stats)) => return Some(stats),
                Err(RecvTimeoutError::Disconnected) => return None,
                Err(RecvTimeoutError::Timeout) => {
                    if cancel.is_cancelled() {
                        worker_cancel.cancel();
                        return None;
                    }
                    if Instant::now() >= deadline {
                        log::warn!(
                            "playback still running after {:.1}s; stopping it",
                            self.config.drain_timeout().as_secs_f32()
                        );
                        worker_cancel.cancel();
                        return None;
                    }
                }
            }
        }
    }
}

/// Handle worker events that have already arrived, without blocking.
fn poll_worker(
    events: &Receiver<WorkerEvent>,
    speaking: &mut bool,
    on_speaking: &mut dyn FnMut(),
    finished: &mut Option<PlaybackStats>,
) {
    while let Ok(event) = events.try_recv() {
        match event {
            WorkerEvent::Started => announce(speaking, on_speaking),
            WorkerEvent::Finished(stats) => *finished = Some(stats),
        }
    }
}

fn announce(speaking: &mut bool, on_speaking: &mut dyn FnMut()) {
    if !*speaking {
        *speaking = true;
        on_speaking();
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        log::error!("playback thread panicked");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
