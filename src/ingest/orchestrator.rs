//! Ingestion orchestration: runs the parser → adapter → writer pipeline on
//! its own OS thread with a private runtime and connection pool, so a long
//! CPU-bound parse can never stall request serving. The isolate talks back
//! through a typed message channel.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use crate::config::{DatabaseConfig, EtlConfig};
use crate::db;
use crate::error::AppError;
use crate::ingest::adapter;
use crate::ingest::writer::BatchWriter;
use crate::ingest::xml::RecordReader;
use crate::models::IngestReport;

/// Emit a progress message every this many records.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Messages the ingestion isolate sends its caller.
#[derive(Debug)]
pub enum IngestMessage {
    Progress { processed: u64 },
    Done(IngestReport),
    Error { message: String },
}

/// Spawn the ingestion isolate and return its message stream.
///
/// The thread owns everything: file handle, parser state, batch writer and
/// its pool. The channel is the only link back to the caller.
pub fn spawn_ingestion(
    file_path: String,
    database: DatabaseConfig,
    etl: EtlConfig,
) -> mpsc::UnboundedReceiver<IngestMessage> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawn_result = std::thread::Builder::new()
        .name("abr-ingest".to_string())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            match runtime {
                Ok(runtime) => {
                    if let Err(err) =
                        runtime.block_on(run_pipeline(&file_path, &database, &etl, &tx))
                    {
                        let _ = tx.send(IngestMessage::Error {
                            message: format!("{err:#}"),
                        });
                    }
                }
                Err(err) => {
                    let _ = tx.send(IngestMessage::Error {
                        message: format!("failed to start ingestion runtime: {err}"),
                    });
                }
            }
        });

    if let Err(err) = spawn_result {
        // The sender went down with the dropped closure; report through a
        // fresh channel instead.
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(IngestMessage::Error {
            message: format!("failed to spawn ingestion thread: {err}"),
        });
        return rx;
    }

    rx
}

/// Run an ingestion to completion and return its report.
///
/// Resolves on the first `Done`, fails on the first `Error`, and fails if
/// the isolate goes away without reporting either. Used identically by the
/// HTTP ingest endpoint and the seed CLI.
pub async fn run_ingestion(
    file_path: &str,
    database: DatabaseConfig,
    etl: EtlConfig,
) -> Result<IngestReport, AppError> {
    let file_path = file_path.trim();
    if file_path.is_empty() {
        return Err(AppError::Validation("filePath is required".to_string()));
    }
    if !Path::new(file_path).is_file() {
        return Err(AppError::Validation(format!(
            "File not found: {file_path}"
        )));
    }

    let mut rx = spawn_ingestion(file_path.to_string(), database, etl);
    while let Some(message) = rx.recv().await {
        match message {
            IngestMessage::Progress { processed } => {
                tracing::info!(processed, "ingestion progress");
            }
            IngestMessage::Done(report) => return Ok(report),
            IngestMessage::Error { message } => {
                return Err(AppError::Internal(anyhow::anyhow!(message)));
            }
        }
    }
    Err(AppError::Internal(anyhow::anyhow!(
        "ingestion worker exited without reporting a result"
    )))
}

/// The pipeline body: stream records out of the file, normalize each one,
/// and hand it to the batch writer. The sequential `add().await` is the
/// backpressure point: parsing cannot outrun the writer, so the in-flight
/// buffer is bounded by the batch size.
async fn run_pipeline(
    file_path: &str,
    database: &DatabaseConfig,
    etl: &EtlConfig,
    tx: &mpsc::UnboundedSender<IngestMessage>,
) -> Result<()> {
    let started = Instant::now();
    tracing::info!(file_path, "starting ingestion");

    let pool = db::ingest_pool(database, etl).await?;
    let writer = BatchWriter::new(pool, etl);

    let file = File::open(file_path)
        .with_context(|| format!("failed to open source file {file_path}"))?;
    let mut reader = RecordReader::new(BufReader::new(file));

    let mut processed: u64 = 0;
    while let Some(raw) = reader.next_record()? {
        let business = adapter::normalize(raw);
        writer
            .add(business)
            .await
            .map_err(|err| anyhow::anyhow!("batch write failed: {err}"))?;
        processed += 1;
        if processed % PROGRESS_INTERVAL == 0 {
            let _ = tx.send(IngestMessage::Progress { processed });
        }
    }

    writer
        .flush()
        .await
        .map_err(|err| anyhow::anyhow!("final flush failed: {err}"))?;
    let total_inserted = writer
        .destroy()
        .await
        .map_err(|err| anyhow::anyhow!("writer teardown failed: {err}"))?;

    let report = IngestReport {
        total_processed: processed,
        total_inserted,
        // The writer does not distinguish inserts from updates.
        total_updated: 0,
        duration_ms: started.elapsed().as_millis() as u64,
    };
    tracing::info!(
        total_processed = report.total_processed,
        total_inserted = report.total_inserted,
        duration_ms = report.duration_ms,
        "ingestion complete"
    );
    let _ = tx.send(IngestMessage::Done(report));
    Ok(())
}
