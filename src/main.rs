//! Application entry point.
//!
//! # Startup sequence
//!
//! 1. Parse CLI flags and initialise logging.
//! 2. Load [`AppConfig`] and apply flag overrides.
//! 3. Load the Whisper model (fatal when missing).
//! 4. Build generators, the router, the speech engine and the player.
//! 5. With `--file`, answer that recording and exit.  Otherwise build the
//!    wake gate unless `--no-wake`.
//! 6. Open the microphone and start streaming frames.
//! 7. Install the Ctrl-C handler.
//! 8. Run [`PipelineStateMachine::run`] on the main thread until cancelled.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;

use voice_assistant::{
    audio::{AudioCapture, AudioSink, CpalPlayer},
    config::{AppConfig, AppPaths, RouterMode, SilenceMode},
    llm::{AnthropicGenerator, OllamaGenerator, QueryRouter, ResponseGenerator},
    pipeline::{PipelineComponents, PipelineStateMachine, StreamingSynthesizer},
    stt::{TranscribeParams, Transcriber, WhisperEngine},
    tts::{HttpSpeechEngine, Synthesizer},
    wake::{TranscriptWakeScorer, WakeGate},
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SilenceArg {
    Energy,
    Adaptive,
}

impl From<SilenceArg> for SilenceMode {
    fn from(arg: SilenceArg) -> Self {
        match arg {
            SilenceArg::Energy => SilenceMode::Energy,
            SilenceArg::Adaptive => SilenceMode::Adaptive,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RouterArg {
    Local,
    Remote,
    Hybrid,
}

impl From<RouterArg> for RouterMode {
    fn from(arg: RouterArg) -> Self {
        match arg {
            RouterArg::Local => RouterMode::Local,
            RouterArg::Remote => RouterMode::Remote,
            RouterArg::Hybrid => RouterMode::Hybrid,
        }
    }
}

/// Hands-free voice assistant.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (defaults to the platform config directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Always listen instead of waiting for the wake word.
    #[arg(long)]
    no_wake: bool,

    #[arg(long, value_enum)]
    silence_mode: Option<SilenceArg>,

    /// RMS level a frame must exceed to count as speech.
    #[arg(long)]
    silence_threshold: Option<f32>,

    /// Seconds of silence that end an utterance.
    #[arg(long)]
    silence_duration: Option<f32>,

    #[arg(long, value_enum)]
    router: Option<RouterArg>,

    /// Debug-level logging.
    #[arg(long)]
    debug: bool,

    /// Log wake scores and suppressed triggers.
    #[arg(long)]
    wake_debug: bool,

    /// Answer a recorded WAV file instead of the microphone, then exit.
    #[arg(long, value_name = "WAV")]
    file: Option<PathBuf>,

    /// Print the effective settings as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if self.no_wake {
            config.wake.enabled = false;
        }
        if let Some(mode) = self.silence_mode {
            config.endpoint.mode = mode.into();
        }
        if let Some(threshold) = self.silence_threshold {
            config.endpoint.threshold = threshold;
        }
        if let Some(secs) = self.silence_duration {
            config.endpoint.silence_secs = secs;
        }
        if let Some(router) = self.router {
            config.llm.router_mode = router.into();
        }
        if self.wake_debug {
            config.wake.debug = true;
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. CLI + logging
    let cli = Cli::parse();
    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // 2. Configuration
    let paths = AppPaths::new();
    let settings_file = cli.config.clone().unwrap_or_else(|| paths.settings_file.clone());
    let mut config = AppConfig::load_from(&settings_file)
        .with_context(|| format!("reading {}", settings_file.display()))?;
    cli.apply(&mut config);

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    log::info!("voice assistant starting (settings: {})", settings_file.display());

    // 3. Speech-to-text
    let model_path = paths.model_path(&config.stt.model_file);
    let whisper = WhisperEngine::load(&model_path, TranscribeParams::from_config(&config.stt))
        .with_context(|| format!("loading Whisper model {}", model_path.display()))?;
    if let Err(e) = whisper.warm_up() {
        log::warn!("whisper warm-up failed: {e}");
    }
    let transcriber: Arc<dyn Transcriber> = Arc::new(whisper);

    // 4. Generation + speech
    let local = OllamaGenerator::from_config(&config.llm.local);
    if let Err(e) = local.warm_up() {
        log::warn!("local model warm-up failed: {e}");
    }
    let remote = AnthropicGenerator::from_config(&config.llm.remote);
    if !remote.is_available() {
        log::info!("no remote API key configured; remote requests fall back to local");
    }
    let router = QueryRouter::new(
        config.llm.router_mode,
        Some(Arc::new(local) as Arc<dyn ResponseGenerator>),
        Some(Arc::new(remote) as Arc<dyn ResponseGenerator>),
    );
    log::info!("router mode: {:?}", router.mode());

    let playback_rate = config.audio.playback_sample_rate;
    let tts = HttpSpeechEngine::from_config(&config.tts, playback_rate);
    if let Err(e) = tts.warm_up() {
        log::warn!("speech engine warm-up failed: {e}");
    }
    let player = CpalPlayer::open(playback_rate).context("opening output device")?;
    let speaker = StreamingSynthesizer::new(
        Arc::new(tts) as Arc<dyn Synthesizer>,
        Arc::new(player) as Arc<dyn AudioSink>,
        config.speech.clone(),
    );

    // 5. Recorded file or wake gate
    if let Some(path) = cli.file.as_deref() {
        return answer_file(&config, transcriber, router, speaker, path);
    }
    let wake = config.wake.enabled.then(|| {
        let scorer = TranscriptWakeScorer::new(
            Arc::clone(&transcriber),
            &config.wake,
            config.audio.capture_sample_rate,
        );
        WakeGate::new(Box::new(scorer), &config.wake)
    });

    // 6. Microphone
    let (frame_tx, frame_rx) = mpsc::sync_channel(config.audio.frame_queue_capacity);
    let capture = AudioCapture::open(&config.audio).context("opening microphone")?;
    let capture_handle = capture.start(frame_tx).context("starting microphone stream")?;

    // 7. Ctrl-C
    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone())?;

    // 8. Voice loop
    let components = PipelineComponents {
        transcriber,
        router,
        speaker,
        wake,
    };
    let mut machine = PipelineStateMachine::new(&config, components, frame_rx, cancel);
    let result = machine.run();

    let dropped = capture_handle.dropped_frames();
    drop(capture_handle);
    if dropped > 0 {
        log::debug!("{dropped} frames dropped while busy");
    }
    result.context("voice loop stopped")?;
    log::info!("goodbye");
    Ok(())
}

fn answer_file(
    config: &AppConfig,
    transcriber: Arc<dyn Transcriber>,
    router: QueryRouter,
    speaker: StreamingSynthesizer,
    path: &Path,
) -> Result<()> {
    let (_frame_tx, frame_rx) = mpsc::sync_channel(1);
    let components = PipelineComponents {
        transcriber,
        router,
        speaker,
        wake: None,
    };
    let mut machine =
        PipelineStateMachine::new(config, components, frame_rx, CancellationToken::new());
    match machine
        .process_file(path)
        .with_context(|| format!("answering {}", path.display()))?
    {
        Some(metrics) => log::info!("\n{metrics}"),
        None => log::info!("no speech in {}", path.display()),
    }
    Ok(())
}

/// Cancel `token` on the first Ctrl-C.
fn spawn_interrupt_listener(token: CancellationToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building signal runtime")?;

    std::thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            rt.block_on(async {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            log::error!("could not listen for Ctrl-C: {e}");
                            return;
                        }
                        log::info!("interrupt received; shutting down");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            });
        })
        .context("spawning signal thread")?;
    Ok(())
}
