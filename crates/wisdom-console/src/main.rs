mod dashboard;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dashboard::Input;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use wisdom_core::{
    Command, Config, Console, ConsoleError, ConsoleView, HttpService, MockService, Operation,
    ServiceApi, Session,
};

#[derive(Parser, Debug)]
#[command(name = "wisdom-console")]
#[command(about = "Word of Wisdom console - quotes, challenges and load-test control")]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config/example.local.toml")]
    config: PathBuf,

    /// Service mode: mock or http
    #[arg(long, default_value = "http")]
    mode: String,

    /// Service base URL (overrides config)
    #[arg(long, env = "WISDOM_BASE_URL")]
    base_url: Option<String>,

    /// Print one-shot results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch a quote (the service solves a challenge for it)
    Quote,
    /// Fetch and show a new challenge
    Challenge,
    /// Show current service stats
    Stats,
    /// Start or stop the service-side load test
    Load {
        #[command(subcommand)]
        action: LoadAction,
    },
    /// Interactive dashboard with live stats
    Watch,
}

#[derive(Subcommand, Debug)]
enum LoadAction {
    Start,
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        warn!("Config {:?} not found, using defaults", args.config);
        Config::default()
    };
    if let Some(base_url) = args.base_url.clone() {
        config.target.base_url = base_url;
    }

    let service: Arc<dyn ServiceApi> = match args.mode.as_str() {
        "mock" => Arc::new(MockService::new(config.mock.delay_ms)),
        "http" => Arc::new(
            HttpService::new(&config.target.base_url, config.target.timeout_ms)
                .context("Failed to create HTTP service client")?,
        ),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'http'", args.mode),
    };

    info!(
        "Using {} service at {} (poll every {}ms)",
        service.name(),
        config.target.base_url,
        config.poll.interval_ms
    );

    let console = Console::from_config(&config.poll);
    let op = match args.command {
        Cmd::Watch => return run_watch(console, service).await,
        Cmd::Stats => None,
        Cmd::Quote => Some(Operation::FetchQuote),
        Cmd::Challenge => Some(Operation::FetchChallenge),
        Cmd::Load { action: LoadAction::Start } => Some(Operation::StartLoad),
        Cmd::Load { action: LoadAction::Stop } => Some(Operation::StopLoad),
    };

    let view = run_once(console, service, op).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", dashboard::render(&view, view.challenge_revision > 0));
    }

    if let Some(err) = view.error {
        anyhow::bail!(err);
    }
    Ok(())
}

/// Seed the stats so the load controls reflect the service, then run `op`.
async fn run_once(
    console: Console,
    service: Arc<dyn ServiceApi>,
    op: Option<Operation>,
) -> Result<ConsoleView> {
    let (mut session, _rx) = Session::new(console, service);
    session.start();
    session.settle().await;

    if let Some(op) = op {
        match session.invoke(op) {
            Ok(()) => session.settle().await,
            Err(e) => refused(e, &session.console().view())?,
        }
    }

    Ok(session.console().view())
}

/// Outcome of a one-shot operation whose control was disabled after seeding.
/// Only a seeded view says anything about the load test's state.
fn refused(err: ConsoleError, view: &ConsoleView) -> Result<()> {
    if view.last_updated.is_none() {
        anyhow::bail!("{err}: could not read the load test state from the service");
    }
    match err {
        ConsoleError::ControlDisabled(Operation::StopLoad) => {
            info!("No load test running, nothing to stop");
            Ok(())
        }
        ConsoleError::ControlDisabled(Operation::StartLoad) => {
            anyhow::bail!("Load test already active")
        }
        e => Err(e.into()),
    }
}

async fn run_watch(console: Console, service: Arc<dyn ServiceApi>) -> Result<()> {
    let (session, view_rx) = Session::new(console, service);
    let (tx, commands) = mpsc::channel(16);

    let session_task = tokio::spawn(session.run(commands));
    let dashboard_task = tokio::spawn(dashboard::launch_dashboard(view_rx));
    println!("{}", dashboard::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match dashboard::parse_input(&line) {
            Some(Input::Command(cmd)) => {
                if tx.send(cmd).await.is_err() {
                    break;
                }
            }
            Some(Input::Quit) => break,
            None if line.trim().is_empty() => {}
            None => println!("{}", dashboard::HELP),
        }
    }

    let _ = tx.send(Command::Shutdown).await;
    session_task.await??;
    dashboard_task.await?;
    Ok(())
}
