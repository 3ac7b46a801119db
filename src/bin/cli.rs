//! CLI binary for wisp.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wisp::audio::Recorder;
use wisp::context::ContextWindowManager;
use wisp::engine::command::{CommandRecognition, CommandSynthesis};
use wisp::engine::openai::OpenAiEngine;
use wisp::interaction::{self, InteractionLoop};
use wisp::speech::playback::ProcessPlayer;
use wisp::speech::worker::InterruptHandle;
use wisp::{SpeechControl, SpeechQueueWorker, ToolRegistry, TurnRunner, WispConfig};

/// Wisp: push-to-talk voice conversations with a streaming language model.
#[derive(Parser)]
#[command(name = "wisp", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable spoken output; replies are printed only.
    #[arg(long)]
    no_speech: bool,

    /// Write every recorded take to a timestamped WAV file.
    #[arg(long)]
    debug_audio: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Start a push-to-talk voice conversation.
    Talk,

    /// Type instead of talking; replies are still spoken.
    Chat,

    /// List available audio input devices.
    Devices,

    /// List the tools the assistant can call.
    Tools,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so raw-mode terminal output stays clean. Override
    // the filter with RUST_LOG=debug to see everything.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wisp=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = WispConfig::load_or_default(cli.config.as_deref())?;
    if cli.no_speech {
        config.speech.enabled = false;
    }
    if cli.debug_audio {
        config.audio.debug_dump = true;
    }

    match cli.command.unwrap_or(Command::Talk) {
        Command::Talk => run_talk(config),
        Command::Chat => run_chat(config),
        Command::Devices => list_devices(),
        Command::Tools => list_tools(),
    }
}

fn run_talk(config: WispConfig) -> anyhow::Result<()> {
    println!("Wisp v{}", env!("CARGO_PKG_VERSION"));

    let recorder = Recorder::new(&config.audio)?;
    let recognition = CommandRecognition::new(&config.recognition, recorder.sample_rate())?;

    let (runner, control, interrupt) = build_runner(&config)?;
    let mut runner = runner.with_recognition(
        Box::new(recognition),
        config.recognition.language.clone(),
        Duration::from_secs(config.recognition.timeout_secs),
    );
    runner.begin_session(&config.context.snapshot_key);

    InteractionLoop::new(runner, recorder, control, interrupt).run()?;
    Ok(())
}

fn run_chat(config: WispConfig) -> anyhow::Result<()> {
    println!("Wisp v{} - Text Mode", env!("CARGO_PKG_VERSION"));

    let (mut runner, _control, _interrupt) = build_runner(&config)?;
    runner.begin_session(&config.context.snapshot_key);

    interaction::run_chat(&mut runner)?;
    Ok(())
}

/// Wires the engine, context manager, tools, and (when enabled) the speech
/// worker into a turn runner.
fn build_runner(
    config: &WispConfig,
) -> anyhow::Result<(TurnRunner, Arc<SpeechControl>, Option<InterruptHandle>)> {
    let engine = OpenAiEngine::new(config.engine.clone(), config.context.capacity_tokens)?;
    let context = ContextWindowManager::new(config.cache_dir());
    let registry = ToolRegistry::with_builtins();
    let control = Arc::new(SpeechControl::new());

    let mut runner = TurnRunner::new(
        Box::new(engine),
        context,
        registry,
        control.clone(),
        config.context.trim_threshold,
    );

    let mut interrupt = None;
    if config.speech.enabled {
        let synthesis = Arc::new(CommandSynthesis::new(&config.synthesis)?);
        let player = Arc::new(ProcessPlayer::new(&config.playback)?);
        let worker = SpeechQueueWorker::spawn(
            synthesis,
            player,
            control.clone(),
            Duration::from_millis(config.speech.poll_interval_ms),
        )?;
        interrupt = Some(worker.interrupt_handle());
        runner = runner.with_speech(worker);
    }

    Ok((runner, control, interrupt))
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in Recorder::list_input_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

fn list_tools() -> anyhow::Result<()> {
    let registry = ToolRegistry::with_builtins();
    for name in registry.names() {
        if let Some(tool) = registry.get(name) {
            let summary = tool.description().lines().next().unwrap_or("");
            println!("  {name}: {summary}");
        }
    }
    Ok(())
}
