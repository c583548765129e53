//! Rack Inverter - flip a rack's unit numbering without moving anything
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API (port 3001, inventory from the config directory)
//! rack-inverter serve
//!
//! # Toggle a rack from a script
//! rack-inverter toggle --rack 7 --user ops --inventory dc1.json
//!
//! # Report spans that would block a toggle
//! rack-inverter check --rack 7 --json
//! ```

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "web")]
use rack_inverter::cli::ServeArgs;
use rack_inverter::cli::{CheckArgs, ToggleArgs};
use rack_inverter::constants::APP_BINARY_NAME;

/// Rack Inverter - switch racks between ascending and descending units
#[derive(Parser, Debug)]
#[command(name = APP_BINARY_NAME, author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    #[cfg(feature = "web")]
    Serve(ServeArgs),
    /// Switch a rack's unit order
    Toggle(ToggleArgs),
    /// Check a rack for out-of-range spans
    Check(CheckArgs),
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays clean on stdout
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        #[cfg(feature = "web")]
        Commands::Serve(args) => args.execute(),
        Commands::Toggle(args) => args.execute(),
        Commands::Check(args) => args.execute(),
    }
}
