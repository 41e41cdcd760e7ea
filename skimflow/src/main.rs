//! Skimflow CLI

use anyhow::{Context, Result};
use clap::Parser;
use skimflow::cancellation::CancellationToken;
use skimflow::config::{ConfigOverrides, ProcessConfig};
use skimflow::events::LoggingEventSink;
use skimflow::registry::LibraryCatalog;
use skimflow::run::{RunController, RunSummary, EXIT_FATAL, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
const LOG_ENV: &str = "SKIMFLOW_LOG";

#[derive(Parser, Debug)]
#[command(name = "skimflow")]
#[command(about = "Skimflow - ordered event processing with skim policies")]
#[command(version)]
struct Cli {
    /// Process configuration (.toml, otherwise JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Input event files (NDJSON). Replace the configured inputs when given.
    inputs: Vec<PathBuf>,

    /// Single output file. Replaces the configured outputs.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Events processed concurrently. Output order is unaffected.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Exclude failed events and keep going instead of stopping.
    #[arg(long)]
    skip_failures: bool,

    /// Print the resolved process before running.
    #[arg(long)]
    print_config: bool,

    /// Validate the process and exit without reading events.
    #[arg(long)]
    check: bool,

    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    /// Write the run summary as pretty JSON to this file.
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level, cli.log_json);

    match execute(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn init_tracing(level: tracing::Level, json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(cli: Cli) -> Result<i32> {
    let mut config = ProcessConfig::load(&cli.config)
        .with_context(|| format!("failed to load process configuration {}", cli.config.display()))?;
    config.apply_overrides(&ConfigOverrides {
        input_files: cli.inputs.clone(),
        output: cli.output.clone(),
        workers: cli.workers,
        skip_failures: cli.skip_failures,
    });

    let controller = RunController::new(config, Arc::new(LibraryCatalog::builtin()))
        .with_event_sink(Arc::new(LoggingEventSink::debug()));
    if cli.print_config {
        println!("{}", controller.describe());
    }

    let prepared = controller.prepare().context("process rejected")?;
    if cli.check {
        println!(
            "Process '{}' is valid: {} stage(s), libraries [{}]",
            controller.config().name,
            prepared.pipeline().len(),
            prepared.libraries().names().join(", ")
        );
        return Ok(EXIT_SUCCESS);
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                interrupt.cancel("interrupted");
            }
            Err(err) => warn!(error = %err, "Cannot listen for Ctrl-C"),
        }
    });

    let summary = prepared.run(&cancel).await.context("run stopped")?;
    println!("{summary}");

    if let Some(path) = &cli.summary_json {
        write_summary(path, &summary)?;
        info!(path = %path.display(), "Wrote run summary");
    }

    Ok(summary.exit_code())
}

fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
