use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use sports_writer::scheduler::{AppContext, SchedulingEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Trigger {
    /// Fetch upcoming matches into the store
    Ingest,
    /// Run one generation cycle
    Generate,
    /// Ingest, then generate
    Both,
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a single ingestion and/or generation pass and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Which trigger to run
    #[arg(value_enum, default_value = "both")]
    trigger: Trigger,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let (ctx, _) = AppContext::bootstrap(&args.config).await?;
    let engine = SchedulingEngine::new(ctx);

    if matches!(args.trigger, Trigger::Ingest | Trigger::Both) {
        match engine.ingest().await {
            Some(summary) => info!(
                inserted = summary.inserted,
                skipped = summary.skipped_duplicates + summary.skipped_invalid,
                evicted = summary.evicted,
                "ingestion done"
            ),
            None => info!("ingestion made no changes"),
        }
    }
    if matches!(args.trigger, Trigger::Generate | Trigger::Both) {
        let report = engine.process().await;
        println!(
            "claimed={} completed={} failed={}{}",
            report.claimed,
            report.completed,
            report.failed,
            report
                .stopped
                .map(|s| format!(" stopped={:?}", s))
                .unwrap_or_default()
        );
    }
    Ok(())
}
