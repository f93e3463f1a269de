//! Crossing CLI — plan and inspect weighted multi-dataset epochs.
//!
//! Dry-runs the weighted interleaving, samples one epoch from the configured
//! datasets, and inspects best-model checkpoints.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Crossing: weighted sampling across pedestrian crossing-intent datasets
#[derive(Parser, Debug)]
#[command(name = "crossing", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Show the interleaving for sources of the given sizes
    Plan {
        /// Batches per source, comma separated (e.g. 10,20)
        #[arg(short, long, value_delimiter = ',', required = true)]
        sizes: Vec<usize>,
        /// Source weights, comma separated; the last may be omitted
        #[arg(long, value_delimiter = ',')]
        weights: Option<Vec<f64>>,
        /// Upper bound on batches
        #[arg(short, long)]
        max_batches: Option<usize>,
    },
    /// Run one epoch over the configured datasets and report counts
    Sample {
        /// Upper bound on batches (overrides configuration)
        #[arg(short, long)]
        max_batches: Option<usize>,
        /// Epoch number, selects the shuffle order
        #[arg(long, default_value = "0")]
        epoch: u64,
    },
    /// Inspect best-model checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CheckpointAction {
    /// Print a summary of a checkpoint and its save history
    Inspect {
        /// Checkpoint file (defaults to the configured path)
        path: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "crossing", "crossing")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "crossing.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace)
}
