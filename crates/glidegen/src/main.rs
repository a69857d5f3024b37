//! glidegen command line
//!
//! Usage:
//!   glidegen generate incident problem --output types.d.ts
//!   glidegen generate x_acme_fleet_vehicle --mode scoped --force
//!   glidegen cache list
//!   glidegen cache show incident

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glidegen::config::GlidegenConfig;
use glidegen_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(
    name = "glidegen",
    version,
    about = "Generate TypeScript declarations from instance schema metadata"
)]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.glidegen/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch tables (with their superclasses) and write declarations
    Generate(cli::generate::GenerateArgs),

    /// Inspect the local cache store
    Cache {
        #[command(subcommand)]
        action: cli::cache::CacheAction,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<GlidegenConfig> {
    match path {
        Some(path) => GlidegenConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => GlidegenConfig::load_default().context("Failed to load config"),
    }
}

fn run_command(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    match cli.command {
        Commands::Generate(args) => cli::generate::run(args, config),
        Commands::Cache { action } => cli::cache::run(action, config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "glidegen",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
