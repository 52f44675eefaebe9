//! prefmac - preference-store MAC verification
//!
//! Reproduces the per-path and super MACs protecting a preference snapshot
//! and searches for the canonicalization variant when they do not match.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use prefmac_core::PrefmacConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod capture;
mod commands;

/// prefmac - preference-store MAC verification
#[derive(Parser, Debug)]
#[command(name = "prefmac")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (built-in defaults if omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify every MAC in a capture against a snapshot
    Verify(commands::verify::VerifyArgs),

    /// Search for the variant that reproduces one stored MAC
    Diagnose(commands::diagnose::DiagnoseArgs),

    /// Print the canonical string of one snapshot value
    Canonicalize(commands::canonicalize::CanonicalizeArgs),

    /// Recompute the super-MAC over the snapshot's MAC table
    SuperMac(commands::super_mac::SuperMacArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. Stdout carries command output.
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = match &cli.config {
        Some(path) => PrefmacConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PrefmacConfig::default(),
    };

    // Commands report their own errors and use precise exit codes, so the
    // process exits here rather than through anyhow.
    let exit_code = match &cli.command {
        Commands::Verify(args) => commands::verify::run_verify(args, &config, cli.json),
        Commands::Diagnose(args) => commands::diagnose::run_diagnose(args, &config, cli.json),
        Commands::Canonicalize(args) => {
            commands::canonicalize::run_canonicalize(args, &config, cli.json)
        },
        Commands::SuperMac(args) => commands::super_mac::run_super_mac(args, cli.json),
    };
    std::process::exit(i32::from(exit_code));
}
