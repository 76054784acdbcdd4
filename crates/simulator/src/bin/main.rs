//! `kronos-sim` entry point.

use clap::Parser;
use kronos_simulator::{run_cli, Cli};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
