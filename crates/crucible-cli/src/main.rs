use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(about = "Crucible - audited pipeline from specification to validated binary", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a specification through the generate/build/run/validate rotation
    Run {
        /// Specification text, given inline
        #[arg(long, conflicts_with = "spec_file")]
        spec: Option<String>,
        /// Path to a file holding the specification text
        #[arg(long)]
        spec_file: Option<PathBuf>,
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Allow a console-attached re-run when redirected output breaks
        /// console-handle APIs (loses captured stdout)
        #[arg(long)]
        interactive_fallback: bool,
    },
    /// Check that the build tool, runtime host and role commands are reachable
    Doctor {
        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            spec,
            spec_file,
            config,
            interactive_fallback,
        } => commands::run::run(spec, spec_file, config, interactive_fallback).await?,
        Commands::Doctor { config } => commands::doctor::run(config).await?,
    }

    Ok(())
}
