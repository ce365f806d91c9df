//! sweeplab CLI: run scaling-law sweeps and inspect their results.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// sweeplab: learning-rate and model-size sweeps with loss-curve tables
#[derive(Parser, Debug)]
#[command(name = "sweeplab", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the user and workspace files)
    #[arg(short, long)]
    config: Option<PathBuf>,

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
    /// Run a sweep with the reference backend
    Run(RunArgs),
    /// Print the warmup / inverse-square-root learning-rate curve
    Schedule(ScheduleArgs),
    /// List stored sweeps
    Runs {
        /// Print manifests as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides. Anything left unset comes from the configuration.
#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Sweep axis: "s" (model size) or "lr" (learning rate)
    #[arg(long)]
    axis: Option<String>,

    /// Comma-separated sweep values
    #[arg(long, value_delimiter = ',')]
    values: Option<Vec<f64>>,

    #[arg(long)]
    repetitions: Option<usize>,

    /// Model size used when sweeping learning rates
    #[arg(long)]
    model_size: Option<f64>,

    /// Base learning rate used when sweeping model sizes
    #[arg(long)]
    base_rate: Option<f64>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Evaluate every N training batches
    #[arg(long)]
    log_interval: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    /// Enable the warmup / inverse-square-root schedule
    #[arg(long)]
    schedule: bool,

    /// Log predicted and target labels of the first evaluation batch
    #[arg(long)]
    preview: bool,

    /// Skip the trailing partial training batch
    #[arg(long)]
    drop_last: bool,

    /// Output directory for stored sweeps
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ScheduleArgs {
    /// Width the curve is normalised by
    #[arg(long, default_value = "512")]
    d_model: f64,

    #[arg(long, default_value = "1.0")]
    factor: f64,

    #[arg(long, default_value = "4000")]
    warmup: u64,

    /// Last step to print
    #[arg(long, default_value = "20000")]
    steps: u64,

    /// Print every Nth step
    #[arg(long, default_value = "1000")]
    every: u64,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init,
    /// Show current configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
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

    let log_dir = directories::ProjectDirs::from("dev", "sweeplab", "sweeplab")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sweeplab.log");
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

    commands::handle_command(cli.command, &workspace, cli.config.as_deref())
}
