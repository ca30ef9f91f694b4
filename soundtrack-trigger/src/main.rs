//! soundtrack-trigger - host binding for the SoundTrack pipeline
//!
//! Reads raw storage/document notifications as JSON and hands each one to
//! `Pipeline::handle`. Outcomes are printed as JSON, one per notification.
//! A failed stage call is an outcome, not a process failure: the exit code is
//! non-zero only when the binding itself cannot start.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/soundtrack/config.toml (~/.config/soundtrack/config.toml)
//! - Logs: $XDG_STATE_HOME/soundtrack/soundtrack.log (~/.local/state/soundtrack/soundtrack.log)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use soundtrack_core::{Config, DropReason, Outcome, Pipeline, RawNotification};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "soundtrack-trigger")]
#[command(about = "Feed storage and document notifications into the SoundTrack pipeline")]
#[command(version)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/soundtrack/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also log to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle one JSON notification
    Handle {
        /// Input file; stdin when omitted or "-"
        input: Option<PathBuf>,
    },

    /// Handle a JSON Lines stream of notifications concurrently
    Replay {
        /// Input file; stdin when omitted or "-"
        input: Option<PathBuf>,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if args.verbose {
        config.logging.stderr = true;
    }

    let _log_guard =
        soundtrack_core::logging::init(&config.logging).context("failed to initialize logging")?;

    match args.command {
        Command::Handle { input } => cmd_handle(config, input.as_deref()).await,
        Command::Replay { input } => cmd_replay(config, input.as_deref()).await,
        Command::Config => cmd_config(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?;
            config.apply_env();
            config
                .pipeline
                .validate()
                .context("invalid pipeline configuration")?;
            Ok(config)
        }
        None => Config::load().context("failed to load configuration"),
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .with_context(|| format!("failed to read {}", p.display())),
        _ => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Run one notification through the pipeline, or report why it was dropped
async fn handle_line(pipeline: &Pipeline, line: &str) -> Outcome {
    match RawNotification::from_json(line) {
        Ok(notification) => pipeline.handle(notification).await,
        Err(reason) => unparseable(reason),
    }
}

fn unparseable(reason: DropReason) -> Outcome {
    tracing::warn!(reason = %reason, "Dropping unparseable notification");
    Outcome::Dropped {
        origin: "unknown",
        notification: "<unparseable>".to_string(),
        reason,
    }
}

fn print_outcome(outcome: &Outcome) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string(outcome).context("failed to encode outcome")?
    );
    Ok(())
}

async fn cmd_handle(config: Config, input: Option<&Path>) -> Result<()> {
    let pipeline = Pipeline::new(config.pipeline).context("failed to create pipeline")?;
    let payload = read_input(input)?;

    tracing::info!("soundtrack-trigger handling one notification");
    let outcome = handle_line(&pipeline, payload.trim()).await;
    print_outcome(&outcome)
}

async fn cmd_replay(config: Config, input: Option<&Path>) -> Result<()> {
    let pipeline = Arc::new(Pipeline::new(config.pipeline).context("failed to create pipeline")?);
    let payload = read_input(input)?;

    let lines: Vec<String> = payload
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();

    tracing::info!(count = lines.len(), "soundtrack-trigger replaying notifications");

    let mut tasks = tokio::task::JoinSet::new();
    for (index, line) in lines.into_iter().enumerate() {
        let pipeline = pipeline.clone();
        tasks.spawn(async move { (index, handle_line(&pipeline, &line).await) });
    }

    let mut outcomes: Vec<Option<Outcome>> = vec![None; tasks.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.context("notification task panicked")?;
        outcomes[index] = Some(outcome);
    }

    for outcome in outcomes.iter().flatten() {
        print_outcome(outcome)?;
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
