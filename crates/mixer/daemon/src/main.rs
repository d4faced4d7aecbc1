//! Mixer Daemon - roster replay
//!
//! Loads a roster and an event script, drives them through the runtime and
//! prints the resulting channel state as JSON.

use clap::Parser;
use mixer_daemon::{load_roster, load_script, DaemonConfig, DaemonResult, Replay};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mixer Daemon CLI
#[derive(Parser)]
#[command(name = "mixerd")]
#[command(about = "Mixer Daemon - roster and membership replay", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MIXER_CONFIG")]
    config: Option<String>,

    /// Roster JSON file (array of entities)
    #[arg(short, long, env = "MIXER_ROSTER")]
    roster: Option<String>,

    /// Event script JSON file
    #[arg(short, long, env = "MIXER_EVENTS")]
    events: Option<String>,

    /// Account name, overriding the configuration file
    #[arg(short, long, env = "MIXER_ACCOUNT")]
    account: Option<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log level
    #[arg(long, env = "MIXER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "MIXER_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the snapshots
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if let Some(account) = cli.account {
        config.account.account = account;
    }

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let roster = match &cli.roster {
        Some(path) => load_roster(path)?,
        None => Vec::new(),
    };
    let script = match &cli.events {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };

    tracing::info!(
        account = %config.account.account,
        entities = roster.len(),
        steps = script.len(),
        "Starting replay"
    );

    let snapshots = Replay::new(config.mixer_config()?, roster)?
        .open_groups(config.replay.open_groups)
        .run(script)
        .await?;

    let rendered = if config.replay.pretty {
        serde_json::to_string_pretty(&snapshots)?
    } else {
        serde_json::to_string(&snapshots)?
    };
    println!("{}", rendered);
    Ok(())
}
