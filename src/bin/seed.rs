//! Offline seed CLI: load one ABR bulk-extract XML file into the store.
//!
//! Shares the ingestion orchestrator with the HTTP endpoint, so semantics
//! (batching, retry, idempotent upserts) are identical.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use abr_search::config::Config;
use abr_search::db;
use abr_search::db::schema;
use abr_search::ingest::orchestrator::{self, IngestMessage};

#[derive(Debug, Parser)]
#[command(
    name = "abr-seed",
    about = "Load an ABR bulk-extract XML file into the search store"
)]
struct Args {
    /// Path to the extract XML file
    #[arg(long)]
    file: PathBuf,

    /// Override DATABASE_URL from the environment
    #[arg(long)]
    database_url: Option<String>,

    /// Override the batch writer flush threshold
    #[arg(long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::from_env().context("configuration error")?;
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if let Some(batch_size) = args.batch_size {
        config.etl.batch_size = batch_size;
    }
    config.validate().context("configuration error")?;

    let file_path = args.file.to_string_lossy().to_string();
    tracing::info!(file = %file_path, "seeding from extract file");

    // Make sure the schema exists before the isolate starts writing.
    let pool = db::serving_pool(&config.database).await?;
    schema::migrate(&pool)
        .await
        .context("schema migration failed")?;
    pool.close().await;

    if !args.file.is_file() {
        bail!("File not found: {file_path}");
    }

    let mut rx =
        orchestrator::spawn_ingestion(file_path, config.database.clone(), config.etl.clone());
    while let Some(message) = rx.recv().await {
        match message {
            IngestMessage::Progress { processed } => {
                tracing::info!(processed, "progress");
            }
            IngestMessage::Done(report) => {
                tracing::info!(
                    total_processed = report.total_processed,
                    total_inserted = report.total_inserted,
                    total_updated = report.total_updated,
                    duration_ms = report.duration_ms,
                    "seed complete"
                );
                return Ok(());
            }
            IngestMessage::Error { message } => {
                bail!("ingestion failed: {message}");
            }
        }
    }

    bail!("ingestion worker exited without reporting a result")
}
