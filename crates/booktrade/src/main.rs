use std::time::Duration;

use anyhow::{Context, Result};
use booktrade::simulation::{Simulation, SimulationSettings};
use booktrade_models::PeerConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "booktrade", about = "Autonomous book-trading peers on a local marketplace")]
struct Cli {
    /// Path to configuration file; built-in defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Number of trading peers
    #[arg(short, long, default_value_t = 3)]
    peers: usize,

    /// Session length in seconds
    #[arg(short, long, default_value_t = 30)]
    duration: u64,

    /// RNG seed for reproducible endowments
    #[arg(long)]
    seed: Option<u64>,

    /// Pretty-print the final summary JSON
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config: PeerConfig = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {path}"))?;
            toml::from_str(&raw).with_context(|| "Failed to parse config")?
        }
        None => PeerConfig::default(),
    };

    let settings = SimulationSettings {
        peers: cli.peers,
        seed: cli.seed,
        ..SimulationSettings::default()
    };

    let simulation = Simulation::start(&config, &settings)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start session: {e}"))?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Interrupted, ending session"),
        _ = tokio::time::sleep(Duration::from_secs(cli.duration)) => {
            tracing::info!(seconds = cli.duration, "Session over");
        }
    }

    let summaries = simulation.summaries();
    simulation.shutdown().await;

    // Final account states as JSON to stdout
    let output = if cli.pretty {
        serde_json::to_string_pretty(&summaries)?
    } else {
        serde_json::to_string(&summaries)?
    };
    println!("{output}");

    Ok(())
}
