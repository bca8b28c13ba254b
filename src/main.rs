use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use sports_writer::scheduler::{AppContext, SchedulingEngine};

#[derive(Debug, Parser)]
#[command(author, version, about = "Generate and schedule match preview articles")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let (ctx, cfg) = AppContext::bootstrap(&args.config).await?;
    let engine = SchedulingEngine::new(ctx);

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    info!(config = %args.config.display(), "starting sports writer");
    engine
        .run(
            Duration::from_secs(cfg.app.ingest_interval_secs),
            Duration::from_secs(cfg.app.generation_interval_secs),
            shutdown,
        )
        .await;
    info!("stopped");
    Ok(())
}
