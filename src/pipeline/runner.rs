//! The voice loop: wake → listen → transcribe → generate → speak → rest.
//!
//! [`PipelineStateMachine`] owns every per-interaction component and is the
//! only place [`PipelineState`] changes.  Microphone frames arrive on one
//! bounded channel and are routed by state:
//!
//! ```text
//!                   ┌────────── Idle ──────────┐
//! frame channel ───▶│ WakeGate::feed           │── on_wake ─▶ pause gate
//!                   └──────────────────────────┘                 │
//!                   ┌──────── Listening ───────┐                 ▼
//!                   │ SilenceEndpointer::push  │◀────────────────┘
//!                   └────────────┬─────────────┘
//!                                ▼ Utterance
//!            Processing: Transcriber → QueryRouter → StreamingSynthesizer
//!                                ▼ first buffer plays
//!            Speaking ─── drained ──▶ flush stale frames, resume gate, Idle
//! ```
//!
//! Frames that arrive while `Processing`/`Speaking` stay in the channel (or
//! are dropped by capture when it is full) and are flushed before the loop
//! consumes frames again.

use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::audio::{
    load_wav, AudioFrame, CaptureError, EndpointStatus, SilenceEndpointer, UtteranceOutcome,
};
use crate::config::{AppConfig, EndpointConfig};
use crate::llm::QueryRouter;
use crate::pipeline::error::{InteractionError, PipelineError};
use crate::pipeline::metrics::InteractionMetrics;
use crate::pipeline::speaker::StreamingSynthesizer;
use crate::pipeline::state::{PipelineEvent, PipelineState};
use crate::stt::Transcriber;
use crate::wake::WakeGate;

/// Extra wall-clock time allowed on top of the maximum recording length
/// before a silent frame source is given up on.
const LISTEN_SLACK: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// PipelineComponents
// ---------------------------------------------------------------------------

/// Engines the state machine drives.  `wake: None` selects always-listening
/// mode.
pub struct PipelineComponents {
    pub transcriber: Arc<dyn Transcriber>,
    pub router: QueryRouter,
    pub speaker: StreamingSynthesizer,
    pub wake: Option<WakeGate>,
}

// ---------------------------------------------------------------------------
// PipelineStateMachine
// ---------------------------------------------------------------------------

pub struct PipelineStateMachine {
    endpoint: EndpointConfig,
    sample_rate: u32,
    poll_interval: Duration,

    transcriber: Arc<dyn Transcriber>,
    router: QueryRouter,
    speaker: StreamingSynthesizer,
    wake: Option<WakeGate>,
    wake_signals: Option<Receiver<()>>,

    frames: Receiver<AudioFrame>,
    cancel: CancellationToken,
    events: Option<Sender<PipelineEvent>>,
    state: PipelineState,
}

impl std::fmt::Debug for PipelineStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStateMachine")
            .field("state", &self.state)
            .field("router_mode", &self.router.mode())
            .field("wake", &self.wake)
            .finish_non_exhaustive()
    }
}

impl PipelineStateMachine {
    pub fn new(
        config: &AppConfig,
        components: PipelineComponents,
        frames: Receiver<AudioFrame>,
        cancel: CancellationToken,
    ) -> Self {
        let state = if components.wake.is_some() {
            PipelineState::Idle
        } else {
            PipelineState::Listening
        };
        Self {
            endpoint: config.endpoint.clone(),
            sample_rate: config.audio.capture_sample_rate,
            poll_interval: config.pipeline.poll_interval(),
            transcriber: components.transcriber,
            router: components.router,
            speaker: components.speaker,
            wake: components.wake,
            wake_signals: None,
            frames,
            cancel,
            events: None,
            state,
        }
    }

    /// Report transitions and interaction outcomes on `events`.
    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn wake_gate(&self) -> Option<&WakeGate> {
        self.wake.as_ref()
    }

    /// Serve interactions until `cancel` fires.
    ///
    /// Only losing the frame source ends the loop early; every
    /// per-interaction failure is logged, reported and recovered from.
    pub fn run(&mut self) -> Result<(), PipelineError> {
        if let Some(gate) = self.wake.as_mut() {
            let (tx, rx) = mpsc::channel();
            gate.start(move || {
                let _ = tx.send(());
            });
            self.wake_signals = Some(rx);
        }
        log::info!("voice loop started in {} state", self.state);

        let result = self.serve();
        self.shutdown();
        result
    }

    fn serve(&mut self) -> Result<(), PipelineError> {
        while !self.cancel.is_cancelled() {
            match self.state {
                PipelineState::Idle => self.wait_for_wake()?,
                PipelineState::Listening => self.listen()?,
                PipelineState::Processing | PipelineState::Speaking => self.return_to_rest(),
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(gate) = self.wake.as_mut() {
            gate.resume();
            gate.stop();
        }
        log::info!("voice loop stopped");
    }

    // -- Idle ---------------------------------------------------------------

    fn wait_for_wake(&mut self) -> Result<(), PipelineError> {
        let Some(frame) = self.next_frame()? else {
            return Ok(());
        };
        let Some(gate) = self.wake.as_mut() else {
            self.transition(PipelineState::Listening);
            return Ok(());
        };

        if let Err(e) = gate.feed(&frame) {
            self.report_failure(&e.into());
            return Ok(());
        }

        let woke = self
            .wake_signals
            .as_ref()
            .map_or(false, |rx| rx.try_iter().count() > 0);
        if woke {
            gate.pause();
            self.transition(PipelineState::Listening);
        }
        Ok(())
    }

    // -- Listening ----------------------------------------------------------

    fn listen(&mut self) -> Result<(), PipelineError> {
        let mut endpointer = SilenceEndpointer::new(&self.endpoint);
        let window = Duration::from_secs_f32(self.endpoint.max_record_secs.max(0.0));
        let deadline = Instant::now() + window + LISTEN_SLACK;
        log::info!("listening...");

        loop {
            if self.cancel.is_cancelled() {
                log::debug!(
                    "shutdown while listening; discarding {} frames",
                    endpointer.frame_count()
                );
                return Ok(());
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "frames stopped arriving within the recording window (speech heard: {})",
                    endpointer.speech_heard()
                );
                break;
            }
            if let Some(frame) = self.next_frame()? {
                let status = endpointer.push(&frame);
                if status == EndpointStatus::MaxDuration {
                    log::info!("recording capped at {:.1}s", endpointer.recorded_secs());
                }
                if status.is_done() {
                    break;
                }
            }
        }

        match endpointer.finish() {
            UtteranceOutcome::NoSpeech(reason) => {
                log::debug!("no speech detected ({reason:?})");
                self.emit(PipelineEvent::NoSpeech);
                self.return_to_rest();
            }
            UtteranceOutcome::Speech(utterance) => {
                log::debug!(
                    "utterance of {} frames ({:.2}s)",
                    utterance.frame_seqs().len(),
                    utterance.duration_secs()
                );
                self.transition(PipelineState::Processing);
                match self.process(utterance.samples()) {
                    Ok(Some(metrics)) => {
                        log::info!("\n{metrics}");
                        self.emit(PipelineEvent::InteractionCompleted(metrics));
                    }
                    Ok(None) => self.emit(PipelineEvent::NoSpeech),
                    Err(e) => self.report_failure(&e),
                }
                self.return_to_rest();
            }
        }
        Ok(())
    }

    // -- Processing / Speaking ----------------------------------------------

    /// Run a recorded WAV file through transcription, generation and speech
    /// without the microphone or the wake gate.  The machine ends up back
    /// in its resting state.
    pub fn process_file(
        &mut self,
        path: &Path,
    ) -> Result<Option<InteractionMetrics>, InteractionError> {
        let samples = load_wav(path, self.sample_rate)?;
        log::info!("processing {}", path.display());

        self.transition(PipelineState::Processing);
        let result = self.process(&samples);
        let rest = if self.wake.is_some() {
            PipelineState::Idle
        } else {
            PipelineState::Listening
        };
        self.transition(rest);
        result
    }

    /// Run one interaction.  `Ok(None)` means the audio held no words.
    fn process(&mut self, samples: &[f32]) -> Result<Option<InteractionMetrics>, InteractionError> {
        let started = Instant::now();
        log::debug!(
            "transcribing {:.2}s of audio",
            samples.len() as f32 / self.sample_rate.max(1) as f32
        );

        let transcript = self.transcriber.transcribe(samples)?;
        let text = transcript.text.trim().to_string();
        if text.is_empty() {
            log::info!("transcript was empty");
            return Ok(None);
        }
        log::info!("heard: {text:?}");

        if log::log_enabled!(log::Level::Debug) {
            let why = self.router.explain(&text);
            log::debug!(
                "route {:?} -> {} ({} words, remote {:?}, local {:?})",
                why.mode,
                why.decision,
                why.word_count,
                why.remote_signals,
                why.local_signals
            );
        }

        let mut metrics = InteractionMetrics::new(text.clone(), transcript.latency);
        let routed = self.router.route(&text)?;
        metrics.backend = Some(routed.backend);

        let speaker = self.speaker.clone();
        let cancel = self.cancel.clone();
        let report = speaker.speak(routed.tokens, &cancel, &mut || {
            self.transition(PipelineState::Speaking)
        })?;

        let first_token = report.first_token.unwrap_or_default();
        metrics.first_token = first_token;
        metrics.generation_total = report.generation_total;
        metrics.first_audio = report.first_audio.map_or(Duration::ZERO, |audio| {
            InteractionMetrics::first_audio_after_token(first_token, audio)
        });
        metrics.synthesis_total = report.synthesis_total;
        metrics.playback = report.playback_total;
        metrics.token_count = report.token_count;
        metrics.response = report.text.trim().to_string();
        metrics.end_to_end = started.elapsed();
        Ok(Some(metrics))
    }

    // -- Helpers ------------------------------------------------------------

    /// Back to `Idle` (wake mode) or `Listening`, discarding anything the
    /// microphone picked up while it was supposed to be ignored.
    fn return_to_rest(&mut self) {
        if self.state.is_microphone_muted() {
            let stale = self.frames.try_iter().count();
            if stale > 0 {
                log::debug!("discarded {stale} frames captured while busy");
            }
        }

        match self.wake.as_mut() {
            Some(gate) => {
                gate.resume();
                if let Some(rx) = self.wake_signals.as_ref() {
                    rx.try_iter().for_each(drop);
                }
                self.transition(PipelineState::Idle);
            }
            None => self.transition(PipelineState::Listening),
        }
    }

    /// One frame, or `None` after a poll interval without one.
    fn next_frame(&self) -> Result<Option<AudioFrame>, PipelineError> {
        match self.frames.recv_timeout(self.poll_interval) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) if self.cancel.is_cancelled() => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Disconnected.into()),
        }
    }

    fn transition(&mut self, to: PipelineState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        log::debug!("state: {from} -> {to}");
        self.emit(PipelineEvent::StateChanged { from, to });
    }

    fn report_failure(&self, error: &InteractionError) {
        log::error!("interaction failed: {error}");
        self.emit(PipelineEvent::InteractionFailed(error.to_string()));
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = self.events.as_ref() {
            let _ = tx.send(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc::SyncSender;
    use std::sync::Mutex;
    use std::thread::JoinHandle;

    use crate::audio::file::tests::write_wav;
    use crate::audio::playback::tests::RecordingSink;
    use crate::audio::AudioSink;
    use crate::config::RouterMode;
    use crate::llm::{Backend, ResponseGenerator, ScriptedGenerator};
    use crate::stt::{MockTranscriber, TranscriptionError};
    use crate::tts::{MockSynthesizer, Synthesizer};
    use crate::wake::scorer::test_support::{ScorerLog, ScriptedScorer};

    const RATE: u32 = 16_000;
    const FRAME_LEN: usize = 160;
    const WAKE_LEVEL: f32 = 1.0;
    const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Every frame carries one constant value so its id can be read back
    /// from whatever consumed it.
    fn frame(seq: u64, value: f32) -> AudioFrame {
        AudioFrame::new(seq, vec![value; FRAME_LEN], RATE)
    }

    fn speech_value(seq: u64) -> f32 {
        0.3 + seq as f32 * 1e-4
    }

    fn silence_value(seq: u64) -> f32 {
        seq as f32 * 1e-6
    }

    struct Feeder {
        tx: SyncSender<AudioFrame>,
        seq: u64,
    }

    impl Feeder {
        fn wake(&mut self) {
            self.send(WAKE_LEVEL);
        }

        fn speech(&mut self, n: usize) -> Vec<f32> {
            (0..n).map(|_| self.send(speech_value(self.seq))).collect()
        }

        fn silence(&mut self, n: usize) -> Vec<f32> {
            (0..n).map(|_| self.send(silence_value(self.seq))).collect()
        }

        fn send(&mut self, value: f32) -> f32 {
            self.tx.send(frame(self.seq, value)).unwrap();
            self.seq += 1;
            value
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.pipeline.poll_interval_ms = 10;
        // 1000 samples: seven 160-sample frames of silence.
        config.endpoint.silence_secs = 0.0625;
        config
    }

    struct Harness {
        machine: PipelineStateMachine,
        frames: Option<SyncSender<AudioFrame>>,
        events: Option<Receiver<PipelineEvent>>,
        cancel: CancellationToken,
        transcriber: Arc<MockTranscriber>,
        synth: Arc<MockSynthesizer>,
        sink: Arc<RecordingSink>,
        scorer_log: Option<Arc<Mutex<ScorerLog>>>,
    }

    fn harness(
        config: AppConfig,
        transcriber: MockTranscriber,
        router: QueryRouter,
        with_wake: bool,
    ) -> Harness {
        let transcriber = Arc::new(transcriber);
        let synth = Arc::new(MockSynthesizer::default());
        let sink = Arc::new(RecordingSink::default());
        let speaker = StreamingSynthesizer::new(
            synth.clone() as Arc<dyn Synthesizer>,
            sink.clone() as Arc<dyn AudioSink>,
            config.speech.clone(),
        );

        let (wake, scorer_log) = if with_wake {
            let (scorer, log) = ScriptedScorer::new(&config.wake.label, WAKE_LEVEL);
            (Some(WakeGate::new(Box::new(scorer), &config.wake)), Some(log))
        } else {
            (None, None)
        };

        let (frame_tx, frame_rx) = mpsc::sync_channel(512);
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let components = PipelineComponents {
            transcriber: transcriber.clone() as Arc<dyn Transcriber>,
            router,
            speaker,
            wake,
        };
        let machine = PipelineStateMachine::new(&config, components, frame_rx, cancel.clone())
            .with_events(event_tx);

        Harness {
            machine,
            frames: Some(frame_tx),
            events: Some(event_rx),
            cancel,
            transcriber,
            synth,
            sink,
            scorer_log,
        }
    }

    fn local_router(fragments: &[&str]) -> QueryRouter {
        let local: Arc<dyn ResponseGenerator> = Arc::new(ScriptedGenerator::new("local", fragments));
        QueryRouter::new(RouterMode::Local, Some(local), None)
    }

    /// Collects events until one matches `pred`.  Returns `false` on timeout.
    fn wait_for(
        events: &Receiver<PipelineEvent>,
        seen: &mut Vec<PipelineEvent>,
        pred: impl Fn(&PipelineEvent) -> bool,
    ) -> bool {
        let deadline = Instant::now() + EVENT_TIMEOUT;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match events.recv_timeout(left) {
                Ok(event) => {
                    let hit = pred(&event);
                    seen.push(event);
                    if hit {
                        return true;
                    }
                }
                Err(_) => return false,
            }
        }
        false
    }

    fn entered(state: PipelineState) -> impl Fn(&PipelineEvent) -> bool {
        move |e| matches!(e, PipelineEvent::StateChanged { to, .. } if *to == state)
    }

    fn completed(e: &PipelineEvent) -> bool {
        matches!(e, PipelineEvent::InteractionCompleted(_))
    }

    fn failed(e: &PipelineEvent) -> bool {
        matches!(e, PipelineEvent::InteractionFailed(_))
    }

    /// Runs the machine on this thread while `drive` feeds frames from
    /// another; `drive` returns the events it consumed and shutdown follows.
    fn run_with_driver<F>(h: &mut Harness, drive: F) -> Vec<PipelineEvent>
    where
        F: FnOnce(&mut Feeder, &Receiver<PipelineEvent>) -> Vec<PipelineEvent> + Send + 'static,
    {
        let mut feeder = Feeder {
            tx: h.frames.take().unwrap(),
            seq: 0,
        };
        let events = h.events.take().unwrap();
        let cancel = h.cancel.clone();
        let driver: JoinHandle<Vec<PipelineEvent>> = std::thread::spawn(move || {
            let seen = drive(&mut feeder, &events);
            cancel.cancel();
            seen
        });

        h.machine.run().unwrap();
        driver.join().unwrap()
    }

    fn transitions(events: &[PipelineEvent]) -> Vec<(PipelineState, PipelineState)> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn wake_to_spoken_answer_and_back_to_idle() {
        let mut h = harness(
            test_config(),
            MockTranscriber::ok("what time is it"),
            QueryRouter::new(
                RouterMode::Hybrid,
                Some(Arc::new(ScriptedGenerator::new("local", &["It's", " 3", " PM", "."])) as Arc<dyn ResponseGenerator>),
                Some(Arc::new(ScriptedGenerator::new("remote", &["nope."])) as Arc<dyn ResponseGenerator>),
            ),
            true,
        );

        let events = run_with_driver(&mut h, |feeder, events| {
            let mut seen = Vec::new();
            feeder.wake();
            feeder.speech(10);
            feeder.silence(8);
            wait_for(events, &mut seen, completed);
            wait_for(events, &mut seen, entered(PipelineState::Idle));
            seen
        });

        assert_eq!(h.synth.calls(), vec!["It's 3 PM."]);
        assert_eq!(h.sink.played.lock().unwrap().len(), 1);
        assert_eq!(h.machine.state(), PipelineState::Idle);
        assert_eq!(
            transitions(&events),
            vec![
                (PipelineState::Idle, PipelineState::Listening),
                (PipelineState::Listening, PipelineState::Processing),
                (PipelineState::Processing, PipelineState::Speaking),
                (PipelineState::Speaking, PipelineState::Idle),
            ]
        );

        let metrics = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::InteractionCompleted(m) => Some(m.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(metrics.backend, Some(Backend::Local));
        assert_eq!(metrics.transcript, "what time is it");
        assert_eq!(metrics.response, "It's 3 PM.");
        assert_eq!(metrics.token_count, 4);
    }

    #[test]
    fn shutdown_while_listening_skips_transcription_and_resumes_gate() {
        let mut h = harness(
            test_config(),
            MockTranscriber::ok("never used"),
            local_router(&["Hi."]),
            true,
        );

        run_with_driver(&mut h, |feeder, events| {
            let mut seen = Vec::new();
            feeder.wake();
            wait_for(events, &mut seen, entered(PipelineState::Listening));
            feeder.speech(3);
            std::thread::sleep(Duration::from_millis(30));
            seen
        });

        assert_eq!(h.transcriber.call_count(), 0);
        assert!(h.synth.calls().is_empty());
        let gate = h.machine.wake_gate().unwrap();
        assert!(!gate.is_paused());
        // One reset on start, one on the resume during shutdown.
        assert_eq!(h.scorer_log.as_ref().unwrap().lock().unwrap().resets, 2);
    }

    #[test]
    fn no_frame_reaches_both_consumers() {
        let mut h = harness(
            test_config(),
            MockTranscriber::ok("what time is it"),
            local_router(&["Sure."]),
            true,
        );
        let scorer_log = Arc::clone(h.scorer_log.as_ref().unwrap());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent_by_driver = Arc::clone(&sent);
        let log_for_driver = Arc::clone(&scorer_log);

        run_with_driver(&mut h, move |feeder, events| {
            let mut seen = Vec::new();
            let mut idle = feeder.silence(5);
            feeder.wake();
            let mut speech = feeder.speech(10);
            speech.extend(feeder.silence(8));
            wait_for(events, &mut seen, entered(PipelineState::Idle));
            idle.extend(feeder.silence(3));

            let deadline = Instant::now() + EVENT_TIMEOUT;
            while log_for_driver.lock().unwrap().scored.len() < 9 && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            sent_by_driver.lock().unwrap().push((idle, speech));
            seen
        });

        let scored: HashSet<u32> = scorer_log
            .lock()
            .unwrap()
            .scored
            .iter()
            .map(|v| v.to_bits())
            .collect();
        let received = h.transcriber.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let transcribed: HashSet<u32> = received[0]
            .chunks(FRAME_LEN)
            .map(|frame| frame[0].to_bits())
            .collect();

        assert!(scored.is_disjoint(&transcribed));
        let (idle, speech) = sent.lock().unwrap()[0].clone();
        assert!(idle.iter().all(|v| scored.contains(&v.to_bits())));
        assert!(scored.contains(&WAKE_LEVEL.to_bits()));
        assert!(speech[..10].iter().all(|v| transcribed.contains(&v.to_bits())));
    }

    #[test]
    fn silence_after_wake_returns_to_idle_without_transcribing() {
        let mut config = test_config();
        // 25 frames of 160 samples.
        config.endpoint.max_record_secs = 0.25;
        let mut h = harness(config, MockTranscriber::ok("unused"), local_router(&["Hi."]), true);

        let events = run_with_driver(&mut h, |feeder, events| {
            let mut seen = Vec::new();
            feeder.wake();
            feeder.silence(30);
            wait_for(events, &mut seen, |e| matches!(e, PipelineEvent::NoSpeech));
            wait_for(events, &mut seen, entered(PipelineState::Idle));
            seen
        });

        assert!(events.iter().any(|e| matches!(e, PipelineEvent::NoSpeech)));
        assert_eq!(
            transitions(&events),
            vec![
                (PipelineState::Idle, PipelineState::Listening),
                (PipelineState::Listening, PipelineState::Idle),
            ]
        );
        assert_eq!(h.transcriber.call_count(), 0);
    }

    #[test]
    fn failed_interaction_is_reported_and_the_loop_continues() {
        let mut h = harness(
            test_config(),
            MockTranscriber::scripted(vec![
                Err(TranscriptionError::Inference("decoder exploded".into())),
                Ok("hello".into()),
            ]),
            local_router(&["Hi there."]),
            false,
        );
        assert_eq!(h.machine.state(), PipelineState::Listening);

        let events = run_with_driver(&mut h, |feeder, events| {
            let mut seen = Vec::new();
            feeder.speech(10);
            feeder.silence(8);
            wait_for(events, &mut seen, failed);
            wait_for(events, &mut seen, entered(PipelineState::Listening));
            feeder.speech(10);
            feeder.silence(8);
            wait_for(events, &mut seen, completed);
            seen
        });

        let failure = events
            .iter()
            .find_map(|e| match e {
                PipelineEvent::InteractionFailed(msg) => Some(msg.clone()),
                _ => None,
            })
            .unwrap();
        assert!(failure.contains("decoder exploded"));
        assert!(events.iter().any(completed));
        assert_eq!(h.transcriber.call_count(), 2);
        assert_eq!(h.synth.calls(), vec!["Hi there."]);
    }

    #[test]
    fn generation_failure_does_not_end_the_loop() {
        let failing: Arc<dyn ResponseGenerator> =
            Arc::new(ScriptedGenerator::new("local", &["Partial"]).failing_after(1));
        let mut h = harness(
            test_config(),
            MockTranscriber::ok("tell me something"),
            QueryRouter::new(RouterMode::Local, Some(failing), None),
            false,
        );

        let events = run_with_driver(&mut h, |feeder, events| {
            let mut seen = Vec::new();
            feeder.speech(10);
            feeder.silence(8);
            wait_for(events, &mut seen, failed);
            wait_for(events, &mut seen, entered(PipelineState::Listening));
            seen
        });

        assert!(events.iter().any(failed));
        assert!(h.synth.calls().is_empty());
        assert_eq!(h.machine.state(), PipelineState::Listening);
    }

    #[test]
    fn empty_transcript_skips_generation() {
        let mut h = harness(test_config(), MockTranscriber::ok("   "), local_router(&["Hi."]), false);

        run_with_driver(&mut h, |feeder, events| {
            let mut seen = Vec::new();
            feeder.speech(10);
            feeder.silence(8);
            wait_for(events, &mut seen, |e| matches!(e, PipelineEvent::NoSpeech));
            seen
        });

        assert_eq!(h.transcriber.call_count(), 1);
        assert!(h.synth.calls().is_empty());
    }

    #[test]
    fn lost_frame_source_ends_the_loop() {
        let mut h = harness(test_config(), MockTranscriber::ok("x"), local_router(&["Hi."]), false);
        drop(h.frames.take());

        let err = h.machine.run().unwrap_err();
        assert!(matches!(err, PipelineError::Capture(CaptureError::Disconnected)));
    }

    #[test]
    fn recorded_file_runs_through_the_same_path() {
        let mut h = harness(
            test_config(),
            MockTranscriber::ok("what time is it"),
            local_router(&["It's", " noon."]),
            true,
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("question.wav");
        // Half a second of 48 kHz stereo.
        let interleaved: Vec<f32> = (0..24_000).flat_map(|_| [0.2, 0.4]).collect();
        write_wav(&path, 48_000, 2, &interleaved);

        let metrics = h.machine.process_file(&path).unwrap().unwrap();

        assert_eq!(metrics.transcript, "what time is it");
        assert_eq!(metrics.response, "It's noon.");
        assert_eq!(metrics.backend, Some(Backend::Local));
        assert_eq!(metrics.token_count, 2);
        assert!(metrics.end_to_end >= metrics.transcription);

        let received = h.transcriber.received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        assert!((received[0].len() as i64 - 8_000).abs() <= 64);
        assert!(received[0][1_000..6_000].iter().all(|s| (s - 0.3).abs() < 0.05));

        assert_eq!(h.synth.calls(), vec!["It's noon."]);
        assert_eq!(h.sink.played.lock().unwrap().len(), 1);

        let events: Vec<PipelineEvent> = h.events.take().unwrap().try_iter().collect();
        assert_eq!(
            transitions(&events),
            vec![
                (PipelineState::Idle, PipelineState::Processing),
                (PipelineState::Processing, PipelineState::Speaking),
                (PipelineState::Speaking, PipelineState::Idle),
            ]
        );
        assert_eq!(h.machine.state(), PipelineState::Idle);
    }

    #[test]
    fn unreadable_file_is_an_interaction_error() {
        let mut h = harness(test_config(), MockTranscriber::ok("x"), local_router(&["Hi."]), false);

        let err = h
            .machine
            .process_file(Path::new("/nonexistent/question.wav"))
            .unwrap_err();

        assert!(matches!(err, InteractionError::AudioFile(_)));
        assert_eq!(h.transcriber.call_count(), 0);
        assert_eq!(h.machine.state(), PipelineState::Listening);
    }
}
