//! Spectra - inspect and replay recorded user sessions
//!
//! - `decode`: print a session's normalized events as JSON lines
//! - `timeline`: print the session's event timeline
//! - `play`: replay a session on the headless engine, driven from stdin
//! - `config`: print the effective configuration

mod commands;
mod config;
mod display;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::SpectraConfig;
use spectra_replay::timeline::aggregate;
use spectra_replay::{
    DecodedSession, EngineOptions, EventDecoder, HeadlessEngineFactory, ReplayViewer,
    SessionLoader, SessionPayload, TimelineFilter, ViewerCommand, ViewerConfig, ViewerSnapshot,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

/// Inspect and replay recorded user sessions
#[derive(Parser, Debug)]
#[command(name = "spectra")]
#[command(about = "Inspect and replay recorded user sessions")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./spectra.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session API base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Directory of bundled `<id>.json` sessions, tried before the API
    #[arg(long, global = true)]
    bundled_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print normalized events, one JSON object per line
    Decode {
        #[command(flatten)]
        source: Source,

        /// Only log the per-tier counts
        #[arg(long)]
        report_only: bool,
    },

    /// Print the event timeline
    Timeline {
        #[command(flatten)]
        source: Source,

        /// Category: all, click, network, console, navigation, error
        #[arg(long, default_value = "all")]
        filter: String,

        /// Case-insensitive text search
        #[arg(long, default_value = "")]
        search: String,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay a session; type `help` for commands
    Play {
        /// Session id
        session: String,

        /// Simulate an engine that never reports its current time
        #[arg(long)]
        silent: bool,

        /// Start playing as soon as the engine is ready
        #[arg(long)]
        autoplay: bool,

        /// Playback speed, one of playback.speeds (defaults to playback.default_speed)
        #[arg(long)]
        speed: Option<f64>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct Source {
    /// Session id
    #[arg(required_unless_present = "file")]
    session: Option<String>,

    /// Read the payload from a local file instead
    #[arg(long)]
    file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => SpectraConfig::load_file(path)?,
        None => SpectraConfig::load_from_dir(Path::new("."))?,
    };
    if let Some(base_url) = cli.base_url {
        config.server.base_url = base_url;
    }
    if let Some(dir) = cli.bundled_dir {
        config.sessions.bundled_dir = Some(dir);
    }

    match cli.command {
        Command::Decode {
            source,
            report_only,
        } => cmd_decode(&config, &source, report_only).await,
        Command::Timeline {
            source,
            filter,
            search,
            json,
        } => cmd_timeline(&config, &source, &filter, &search, json).await,
        Command::Play {
            session,
            silent,
            autoplay,
            speed,
        } => {
            let speed = match speed {
                Some(speed) => commands::check_speed(speed, &config.playback.speeds)?,
                None => config.playback.default_speed,
            };
            cmd_play(&config, session, silent, autoplay, speed).await
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn loader(config: &SpectraConfig) -> Result<SessionLoader> {
    SessionLoader::new(config.loader_config()).context("Failed to create HTTP client")
}

async fn read_session(config: &SpectraConfig, source: &Source) -> Result<DecodedSession> {
    let payload = match (&source.file, &source.session) {
        (Some(path), _) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            SessionPayload::from_slice(&bytes)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        (None, Some(session)) => loader(config)?
            .fetch(session)
            .await
            .with_context(|| format!("Failed to load session {session}"))?,
        (None, None) => anyhow::bail!("Either a session id or --file is required"),
    };

    let session = EventDecoder::new().decode_payload(payload);
    let report = &session.report;
    tracing::info!(
        "Decoded {} events: {} structured, {} json, {} compressed, {} base64, {} placeholders",
        report.total(),
        report.structured,
        report.json,
        report.compressed,
        report.base64_compressed,
        report.placeholders
    );
    Ok(session)
}

async fn cmd_decode(config: &SpectraConfig, source: &Source, report_only: bool) -> Result<()> {
    let session = read_session(config, source).await?;
    if report_only {
        return Ok(());
    }

    for event in &session.events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

async fn cmd_timeline(
    config: &SpectraConfig,
    source: &Source,
    filter: &str,
    search: &str,
    json: bool,
) -> Result<()> {
    let session = read_session(config, source).await?;
    let filter: TimelineFilter = filter.parse().unwrap_or_default();
    let entries = aggregate(&session.metadata, &filter, search);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No events match the filter.");
    }
    for (index, entry) in entries.iter().enumerate() {
        println!("{}", display::entry_line(index, entry));
    }
    Ok(())
}

async fn cmd_play(
    config: &SpectraConfig,
    session: String,
    silent: bool,
    autoplay: bool,
    speed: f64,
) -> Result<()> {
    let factory = if silent {
        HeadlessEngineFactory::silent()
    } else {
        HeadlessEngineFactory::new()
    };
    let viewer_config = ViewerConfig {
        clock: config.clock_config(),
        engine: EngineOptions::default(),
    };
    let mut viewer = ReplayViewer::new(factory, viewer_config);
    let loader = loader(config)?;

    let (commands, command_rx) = mpsc::channel(16);
    let (updates, update_rx) = watch::channel(ViewerSnapshot::default());

    commands
        .send(ViewerCommand::Load(session))
        .await
        .context("Viewer stopped before the session was requested")?;

    read_commands(commands.clone(), config.playback.speeds.clone());
    tokio::spawn(report(update_rx, commands, speed, autoplay));

    tracing::info!("Player ready; type `help` for commands");
    viewer.run(loader, command_rx, updates).await;
    Ok(())
}

/// Read commands from stdin on a dedicated thread.
fn read_commands(commands: mpsc::Sender<ViewerCommand>, speeds: Vec<f64>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    tracing::warn!("Failed to read stdin: {}", err);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match commands::parse(&line, &speeds) {
                Ok(Some(command)) => {
                    if commands.blocking_send(command).is_err() {
                        return;
                    }
                }
                Ok(None) => println!("{}", commands::help(&speeds)),
                Err(err) => eprintln!("{err}"),
            }
        }
        let _ = commands.blocking_send(ViewerCommand::Close);
    });
}

/// Print status changes; apply start-up settings once the engine is ready.
async fn report(
    mut updates: watch::Receiver<ViewerSnapshot>,
    commands: mpsc::Sender<ViewerCommand>,
    speed: f64,
    autoplay: bool,
) {
    let mut started = false;
    let mut last_line = String::new();

    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();

        if !started && snapshot.engine_ready {
            started = true;
            if (speed - 1.0).abs() > f64::EPSILON {
                let _ = commands.send(ViewerCommand::SetSpeed(speed)).await;
            }
            if autoplay {
                let _ = commands.send(ViewerCommand::Play).await;
            }
        }

        let line = display::status_line(&snapshot);
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
    }
}
