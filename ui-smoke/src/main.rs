//! ui-smoke — resilient smoke test for the bundled web app.
//!
//! Produces a visual verification (screenshot) and a structured failure
//! diagnosis across heterogeneous execution environments: developer laptop,
//! hardened CI container, network-restricted sandbox. The run degrades
//! gracefully through missing automation toolchains, missing browser
//! binaries, blocked downloads, unreachable servers and flaky navigation,
//! and always finishes with one machine-readable verdict line on stdout and
//! a matching process exit code.
//!
//! All run behavior is driven by environment variables (see
//! `ui_smoke_common::config`); the `preflight` subcommand probes the
//! environment without running the smoke pass.

#![forbid(unsafe_code)]

mod browser;
mod navigate;
mod prober;
mod run;
mod server;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ui_smoke_common::EnvConfig;

#[derive(Parser)]
#[command(name = "ui-smoke")]
#[command(author, version, about = "Browser smoke test with environment-aware degradation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Probe engine and browser availability without running the smoke pass
    Preflight,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout is reserved for the machine-readable summary line; all logging
    // goes to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = EnvConfig::from_env();
    let exit_code = match cli.command {
        Some(Command::Preflight) => run::run_preflight(&config).await,
        None => run::run_smoke(config).await,
    };
    std::process::exit(exit_code);
}
