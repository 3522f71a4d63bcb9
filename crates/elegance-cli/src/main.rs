//! elegance - score chess games for elegance with a UCI engine.
//!
//! `annotate` analyses every game of a PGN file and writes it back with
//! elegance tags and per-move evaluations. `golden` runs a regression
//! manifest and fails when any case falls outside its expected range.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{CliConfig, Overrides, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "elegance")]
#[command(about = "Engine-based elegance scoring for chess games")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log debug output, including engine traffic
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse and annotate every game in a PGN file
    Annotate {
        /// PGN file to read
        pgn: PathBuf,
        /// Write annotated PGN here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Engine executable
        #[arg(short, long)]
        engine: Option<PathBuf>,
        /// Search depth per position
        #[arg(short, long)]
        depth: Option<u32>,
        /// Number of engines running in parallel
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Run a golden regression manifest
    Golden {
        /// Manifest TOML file
        manifest: PathBuf,
        /// Engine executable, overriding the manifest
        #[arg(short, long)]
        engine: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = CliConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Annotate {
            pgn,
            out,
            engine,
            depth,
            jobs,
        } => {
            let config = config
                .with_overrides(&Overrides { engine, depth, jobs })
                .context("Invalid configuration")?;
            let summary = commands::annotate(config, &pgn, out.as_ref()).await?;
            Ok(if summary.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Golden {
            manifest,
            engine,
            json,
        } => {
            let passed = commands::golden(config, &manifest, engine.as_ref(), json).await?;
            Ok(if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
