//! Buffered, transactional bulk writer for the ingestion pipeline.
//!
//! Records accumulate in memory until `batch_size` is reached, then a single
//! transaction upserts the businesses, deletes the batch's existing child
//! names, and inserts the fresh set. Child-name replacement inside the same
//! transaction is what makes re-ingestion idempotent: a business's names
//! always reflect only the latest source record.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sqlx::PgPool;

use crate::config::EtlConfig;
use crate::db::repository::{delete_names_for, insert_names, resolve_ids, upsert_businesses};
use crate::error::AppError;
use crate::models::{NameRow, NewBusiness};

pub struct BatchWriter {
    pool: PgPool,
    batch_size: usize,
    retry_attempts: u32,
    retry_delay: Duration,
    flush_delay: Duration,
    buffer: parking_lot::Mutex<Vec<NewBusiness>>,
    /// Serializes flush execution; overlapping flushes would exhaust the
    /// small private pool and reorder name replacement against the upsert.
    flush_lock: tokio::sync::Mutex<()>,
    total_inserted: AtomicU64,
}

impl BatchWriter {
    pub fn new(pool: PgPool, etl: &EtlConfig) -> Self {
        Self {
            pool,
            batch_size: etl.batch_size.max(1),
            retry_attempts: etl.retry_attempts.max(1),
            retry_delay: Duration::from_millis(etl.retry_delay_ms),
            flush_delay: Duration::from_millis(etl.flush_delay_ms),
            buffer: parking_lot::Mutex::new(Vec::new()),
            flush_lock: tokio::sync::Mutex::new(()),
            total_inserted: AtomicU64::new(0),
        }
    }

    pub fn total_inserted(&self) -> u64 {
        self.total_inserted.load(Ordering::SeqCst)
    }

    /// Buffer one record; flushes (and waits for the flush) once the buffer
    /// reaches `batch_size`.
    pub async fn add(&self, business: NewBusiness) -> Result<(), AppError> {
        let should_flush = {
            let mut buffer = self.buffer.lock();
            buffer.push(business);
            buffer.len() >= self.batch_size
        };
        if should_flush {
            self.flush().await?;
        }
        Ok(())
    }

    /// Drain the buffer and write it as one batch. No-op when empty.
    pub async fn flush(&self) -> Result<(), AppError> {
        let batch = {
            let mut buffer = self.buffer.lock();
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };

        let _guard = self.flush_lock.lock().await;
        self.run_batch(batch).await?;

        // Pacing: cap write throughput so managed stores don't rate-limit us.
        if !self.flush_delay.is_zero() {
            tokio::time::sleep(self.flush_delay).await;
        }
        Ok(())
    }

    /// Wait out any in-flight flush, close the private pool, and report the
    /// total rows written.
    pub async fn destroy(self) -> Result<u64, AppError> {
        drop(self.flush_lock.lock().await);
        self.pool.close().await;
        Ok(self.total_inserted.load(Ordering::SeqCst))
    }

    /// Execute one batch with retry on transient connection failures.
    async fn run_batch(&self, batch: Vec<NewBusiness>) -> Result<(), AppError> {
        let batch = dedup_last_wins(batch);

        let mut attempt = 1;
        loop {
            match self.try_batch(&batch).await {
                Ok(written) => {
                    self.total_inserted.fetch_add(written, Ordering::SeqCst);
                    tracing::debug!(rows = written, "flushed batch");
                    return Ok(());
                }
                Err(err) if attempt < self.retry_attempts && is_transient(&err) => {
                    let backoff = self.retry_delay * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient store failure, retrying: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) if is_transient(&err) => {
                    return Err(AppError::Transient(format!(
                        "batch write failed after {} attempts: {err}",
                        self.retry_attempts
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// One transaction: upsert businesses, then replace their child names.
    /// Rolls back as a whole on any failure; a partial batch never lands.
    async fn try_batch(&self, batch: &[NewBusiness]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let written = upsert_businesses(&mut *tx, batch).await?;

        let names: Vec<(&str, &crate::models::BusinessName)> = batch
            .iter()
            .flat_map(|b| b.other_names.iter().map(move |n| (b.abn.as_str(), n)))
            .collect();

        if !names.is_empty() {
            let abns: Vec<String> = names
                .iter()
                .map(|(abn, _)| (*abn).to_string())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            let ids: HashMap<String, i64> = resolve_ids(&mut *tx, &abns).await?;

            let business_ids: Vec<i64> = ids.values().copied().collect();
            delete_names_for(&mut *tx, &business_ids).await?;

            // An unresolved ABN cannot occur if the upsert above succeeded;
            // skip rather than poison the batch if it somehow does.
            let rows: Vec<NameRow> = names
                .iter()
                .filter_map(|(abn, name)| {
                    ids.get(*abn).map(|id| NameRow {
                        business_id: *id,
                        name_type: name.name_type.clone(),
                        name_text: name.name_text.clone(),
                    })
                })
                .collect();
            insert_names(&mut *tx, &rows).await?;
        }

        tx.commit().await?;
        Ok(written)
    }
}

/// Keep only the last occurrence of each ABN. Duplicates inside one
/// statement would trip "ON CONFLICT DO UPDATE cannot affect row a second
/// time"; document order makes the later record the winner.
fn dedup_last_wins(batch: Vec<NewBusiness>) -> Vec<NewBusiness> {
    let mut seen: HashSet<String> = HashSet::with_capacity(batch.len());
    let mut kept: Vec<NewBusiness> = batch
        .into_iter()
        .rev()
        .filter(|b| seen.insert(b.abn.clone()))
        .collect();
    kept.reverse();
    kept
}

/// Transient connection failures worth retrying: OS-level resets and
/// timeouts, the admin-shutdown SQLSTATE, and the connection-loss message
/// shapes the driver surfaces without a code.
pub(crate) fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::TimedOut
        ),
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("57P01") || is_transient_message(db.message())
        }
        other => is_transient_message(&other.to_string()),
    }
}

pub(crate) fn is_transient_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("connection terminated")
        || message.contains("connection closed")
        || message.contains("connection reset")
        || message.contains("timeout acquiring a connection")
}
