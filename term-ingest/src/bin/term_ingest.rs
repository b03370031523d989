//! Command line runner for ingestion jobs.
//!
//! Loads a YAML job configuration, runs one ingestion pass and prints the
//! run report. The exit code is non-zero unless the run succeeded.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use term_ingest::config::IngestConfig;
use term_ingest::logging::setup::init_logging;
use term_ingest::orchestrator::{RunOptions, RunStatus};
use term_ingest::partition::PartitionId;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML job configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Process partitions up to and including this date (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "all")]
    cutoff: Option<NaiveDate>,

    /// Process every pending partition regardless of date
    #[arg(long)]
    all: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = IngestConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_logging(config.logging.subscriber_config()?)?;

    let orchestrator = config.build_orchestrator()?;

    let cutoff = if args.all {
        None
    } else {
        let date = args.cutoff.unwrap_or_else(|| Utc::now().date_naive());
        Some(PartitionId::from_date(date))
    };
    let options = RunOptions {
        cutoff,
        ..RunOptions::default()
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current partition before stopping");
            let _ = shutdown_tx.send(true);
        }
    });

    let report = orchestrator.run_with_shutdown(options, shutdown_rx).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    info!(run.id = %report.run_id, success = report.is_success(), "Job finished");
    if !report.is_success() {
        process::exit(1);
    }
    Ok(())
}

fn print_summary(report: &term_ingest::orchestrator::RunReport) {
    println!("run {}", report.run_id);
    for outcome in &report.processed {
        match &outcome.output_key {
            Some(key) => println!(
                "  processed {} ({} rows -> {key})",
                outcome.partition_id, outcome.rows_written
            ),
            None => println!("  processed {} (no rows, nothing written)", outcome.partition_id),
        }
    }
    println!(
        "  {} already processed, {} committed, {} left pending",
        report.already_processed.len(),
        report.committed.len(),
        report.not_attempted.len()
    );
    match &report.status {
        RunStatus::Completed => println!("completed"),
        RunStatus::NothingPending => println!("nothing pending"),
        RunStatus::Cancelled => println!("cancelled"),
        RunStatus::Halted { partition, error } => {
            println!("halted at {partition}: {error}")
        }
        RunStatus::Aborted {
            stage,
            error,
            halted,
        } => {
            if let Some(halted) = halted {
                println!("halted at {}: {}", halted.partition, halted.error);
            }
            println!("aborted while {stage}: {error}")
        }
    }
}
