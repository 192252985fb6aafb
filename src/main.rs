use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chain_reaction::{ConsoleSink, Reactor, SimulationConfig};

#[derive(Parser)]
#[command(name = "chain-reaction", version, about = "Concurrent chain reaction simulation")]
struct Cli {
    #[command(flatten)]
    config: SimulationConfig,

    /// Save the final run report (bincode) to this path
    #[arg(long, env = "REPORT_OUT")]
    report_out: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let reactor = Reactor::new(cli.config).context("failed to set up the reactor")?;
    let report = reactor
        .run(&mut ConsoleSink)
        .context("chain reaction failed to start")?;
    println!("{report}");

    if let Some(path) = cli.report_out {
        match report.save(&path) {
            Ok(()) => info!(path = %path.display(), "run report saved"),
            Err(err) => warn!(path = %path.display(), error = %err, "could not save run report"),
        }
    }
    Ok(())
}
