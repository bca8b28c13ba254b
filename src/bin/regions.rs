use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use sports_writer::db;
use sports_writer::scheduler::AppContext;

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage the region selection that scopes ingestion")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the region catalogue from the data provider
    Fetch,
    /// Print stored regions; selected ones are marked with `*`
    List,
    /// Replace the selection with the given region ids
    Select {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Check that the data provider accepts the configured key
    Test,
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
    let api_key = cfg.settings().sport_api_key;

    match args.command {
        Command::Fetch => {
            if api_key.is_empty() {
                bail!("api.sport_api_key is not configured");
            }
            let regions = ctx
                .sports
                .fetch_regions(&api_key)
                .await
                .context("failed to fetch regions")?;
            let inserted = db::upsert_regions(&ctx.pool, &regions).await?;
            info!(fetched = regions.len(), inserted, "regions stored");
            println!("fetched {} regions, {} new", regions.len(), inserted);
        }
        Command::List => {
            let regions = db::list_regions(&ctx.pool).await?;
            if regions.is_empty() {
                println!("no regions stored; run `regions fetch` first");
            }
            for r in regions {
                let mark = if r.selected { '*' } else { ' ' };
                println!("{} {:>4}  {}", mark, r.id, r.name);
            }
        }
        Command::Select { ids } => {
            db::save_selected_regions(&ctx.pool, &ids).await?;
            let names = db::selected_region_names(&ctx.pool).await?;
            println!("selected: {}", names.join(", "));
        }
        Command::Test => {
            if api_key.is_empty() {
                bail!("api.sport_api_key is not configured");
            }
            match ctx.sports.fetch_regions(&api_key).await {
                Ok(regions) => println!("connection ok ({} regions available)", regions.len()),
                Err(e) => bail!("connection failed: {}", e),
            }
        }
    }
    Ok(())
}
