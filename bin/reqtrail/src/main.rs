//! Reqtrail CLI
//!
//! Replays request instrumentation notifications into structured records
//! and inspects record files.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use reqtrail_core::commands::{
    display_schema, display_version, execute_replay, validate_args, validate_record_file,
    ReplayArgs,
};

/// Reqtrail - one structured record per request
#[derive(Parser, Debug)]
#[command(name = "reqtrail")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a notification stream into records
    Replay {
        /// JSON-lines file of notifications
        #[arg(short, long)]
        input: PathBuf,

        /// Append records to this JSON-lines file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// POST records to this collector endpoint
        #[arg(short, long, env = "REQTRAIL_ENDPOINT")]
        endpoint: Option<String>,

        /// Aggregator configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Parameter name to redact (repeatable)
        #[arg(long = "filter-parameter")]
        filter_parameters: Vec<String>,

        /// Print one summary line per record to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Validate a record file
    Validate {
        /// Path to JSON-lines record file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Replay {
            input,
            output,
            endpoint,
            config,
            filter_parameters,
            summary,
        } => {
            let args = ReplayArgs {
                input,
                output,
                endpoint,
                config,
                filter_parameters,
                print_summary: summary,
            };

            // Validate args first
            validate_args(&args)?;

            let report = execute_replay(args)?;
            if report.delivery.failed > 0 {
                log::warn!(
                    "{} deliveries dropped after retries",
                    report.delivery.failed
                );
            }
        }

        Commands::Validate { file } => {
            validate_record_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
