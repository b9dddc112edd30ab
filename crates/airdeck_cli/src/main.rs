//! Airdeck - command-line front end
//!
//! Loads one or two decks, opens their output streams and reads control
//! events from stdin, one per line:
//!
//! ```text
//! left toggle
//! right volume -0.05
//! left speed 0.1
//! left fade
//! right next
//! ```
//!
//! Besides control events the prompt understands `start`, `stop`, `state`,
//! `add <side> <path>` and `quit`. Engine events are printed to stdout as
//! JSON lines; logs go to stderr.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use airdeck_core::{
    AirdeckSettings, AudioEngine, ControlEvent, Deck, Event, FadeMode, FileSource, OutputDevice,
    Side, TrackSource,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "airdeck_cli=info,airdeck_core=info";

/// Command-line arguments for airdeck
#[derive(Parser, Debug)]
#[command(name = "airdeck")]
#[command(about = "Dual-deck player driven by discrete control events")]
#[command(version)]
struct Args {
    /// Tracks for the left deck; the first one is loaded at startup
    left: Vec<PathBuf>,

    /// Tracks for the right deck (repeatable); no right deck when omitted
    #[arg(short, long = "right", value_name = "PATH")]
    right: Vec<PathBuf>,

    /// Settings file to read instead of the platform default
    #[arg(short, long, env = "AIRDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Output device name
    #[arg(short, long, env = "AIRDECK_DEVICE")]
    device: Option<String>,

    /// Output buffer size in frames
    #[arg(short, long)]
    buffer_size: Option<u32>,

    /// How fades are executed
    #[arg(long, value_enum)]
    fade_mode: Option<FadeModeArg>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FadeModeArg {
    Cooperative,
    Blocking,
}

impl From<FadeModeArg> for FadeMode {
    fn from(arg: FadeModeArg) -> Self {
        match arg {
            FadeModeArg::Cooperative => FadeMode::Cooperative,
            FadeModeArg::Blocking => FadeMode::Blocking,
        }
    }
}

/// What a line typed at the prompt asks for
enum Input {
    Control(ControlEvent),
    Start,
    Stop,
    State,
    Add(Side, PathBuf),
    Quit,
}

fn parse_input(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let input = match line.split_whitespace().next().unwrap_or_default() {
        "start" => Input::Start,
        "stop" => Input::Stop,
        "state" => Input::State,
        "quit" | "exit" => Input::Quit,
        "add" => {
            let mut parts = line.splitn(3, char::is_whitespace).skip(1);
            let side: Side = parts.next().unwrap_or_default().parse()?;
            let path = parts.next().map(str::trim).unwrap_or_default();
            if path.is_empty() {
                bail!("usage: add <left|right> <path>");
            }
            Input::Add(side, PathBuf::from(path))
        }
        _ => Input::Control(line.parse()?),
    };
    Ok(Some(input))
}

fn load_settings(args: &Args) -> Result<AirdeckSettings> {
    let mut settings = match &args.config {
        Some(path) => AirdeckSettings::load_from(path)
            .map_err(anyhow::Error::msg)
            .context("Failed to load settings")?,
        None => AirdeckSettings::load(),
    };

    if !args.left.is_empty() {
        settings.left_playlist = args.left.clone();
    }
    if !args.right.is_empty() {
        settings.right_playlist = args.right.clone();
    }
    if let Some(device) = &args.device {
        settings.config.stream.output_device = Some(device.clone());
    }
    if let Some(buffer_size) = args.buffer_size {
        settings.config.stream.buffer_size = buffer_size;
    }
    if let Some(mode) = args.fade_mode {
        settings.config.deck.fade.mode = mode.into();
    }

    settings
        .config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;
    Ok(settings)
}

fn print_event(event: &Event) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize event: {}", e),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    if args.list_devices {
        for device in OutputDevice::enumerate().context("Failed to list output devices")? {
            let marker = if device.is_default { "*" } else { " " };
            println!(
                "{} {} ({} ch, {:?})",
                marker, device.name, device.max_channels, device.sample_rates
            );
        }
        return Ok(());
    }

    let settings = load_settings(&args)?;
    if settings.left_playlist.is_empty() {
        bail!("No tracks given for the left deck");
    }
    if args.save {
        let saved = match &args.config {
            Some(path) => settings.save_to(path),
            None => settings.save(),
        };
        saved.map_err(anyhow::Error::msg).context("Failed to save settings")?;
    }

    let source: Arc<dyn TrackSource> = Arc::new(FileSource);
    let deck_config = settings.config.deck.clone();

    let deck_a = Deck::new(
        "A",
        settings.left_playlist.clone(),
        Arc::clone(&source),
        deck_config.clone(),
    )
    .context("Failed to load left deck")?;
    let deck_b = if settings.right_playlist.is_empty() {
        None
    } else {
        Some(
            Deck::new("B", settings.right_playlist.clone(), source, deck_config)
                .context("Failed to load right deck")?,
        )
    };

    let engine = AudioEngine::new(deck_a, deck_b, settings.config.clone())
        .context("Failed to initialize audio engine")?;
    engine.start().context("Failed to start audio engine")?;
    info!("Airdeck ready, type control events (e.g. 'left toggle') or 'quit'");

    let done = AtomicBool::new(false);
    thread::scope(|scope| -> Result<()> {
        scope.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                if let Some(event) = engine.wait_event_timeout(Duration::from_millis(100)) {
                    print_event(&event);
                }
            }
        });

        let result = read_commands(&engine);
        done.store(true, Ordering::SeqCst);
        result
    })?;

    // Drain anything the control thread reported on the way out
    while let Some(event) = engine.poll_event() {
        print_event(&event);
    }
    info!("Shutting down");
    Ok(())
}

fn read_commands(engine: &AudioEngine) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;

        let input = match parse_input(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        match input {
            Input::Control(event) => engine.send(event)?,
            Input::Start => engine.start()?,
            Input::Stop => engine.stop()?,
            Input::State => engine.request_state()?,
            Input::Add(side, path) => engine.add_track(side, path)?,
            Input::Quit => break,
        }
        io::stdout().flush().context("Failed to flush stdout")?;
    }
    Ok(())
}
