mod cli;
mod compliance;
mod config;
mod identity;
mod keyed;
mod model;
mod monitor;
mod planning;
mod safety;
mod sink;
mod storage;
mod workflow;

use std::process;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Context};
use config::Config;
use storage::Storage;

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .without_time(),
        )
        .init();

    if let Err(e) = open(cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn open(cli: Cli) -> Result<(), String> {
    let config = Config::load()?;
    let tz = config.time_zone()?;
    let path = config.database_path()?;
    let storage = Storage::new(&path)
        .map_err(|e| format!("failed to open database at {}: {e}", path.display()))?;

    let ctx = Context {
        config,
        storage,
        tz,
    };
    cli::run(cli, &ctx)
}
