//! Geo-temporal store benchmark runner
//!
//! Seeds PostgreSQL and Elasticsearch with the same synthetic location data
//! and times the same queries against both.

mod commands;
mod formatter;

use clap::Parser;
use commands::Command;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "geobench=info,geobench_cli=info";

/// Relational vs document store benchmark
#[derive(Parser, Debug)]
#[command(name = "geobench")]
#[command(version, about = "Relational vs document store benchmark for geo-temporal queries")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

fn main() {
    // Logs go to stderr so the report on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
