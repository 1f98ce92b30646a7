//! Store access: schema management and the repository over PostgreSQL.

pub mod repository;
pub mod schema;

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;

use crate::config::{DatabaseConfig, EtlConfig};

/// Timeout for checking a connection out of any pool.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection options shared by the serving and ingestion pools.
///
/// With `ssl` enabled the mode is `Require`: traffic is encrypted but the
/// server certificate is not verified, which is what managed stores with
/// self-signed chains expect.
pub fn connect_options(database: &DatabaseConfig) -> Result<PgConnectOptions> {
    let options: PgConnectOptions = database
        .url
        .parse()
        .context("invalid DATABASE_URL connection string")?;
    let ssl_mode = if database.ssl {
        PgSslMode::Require
    } else {
        PgSslMode::Prefer
    };
    Ok(options.ssl_mode(ssl_mode))
}

/// Serving-plane pool, one per worker process.
pub async fn serving_pool(database: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(database.pool_min)
        .max_connections(database.pool_max)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(connect_options(database)?)
        .await
        .context("failed to connect serving pool")?;
    Ok(pool)
}

/// Ingestion-plane pool: small and private to one ingestion run.
pub async fn ingest_pool(database: &DatabaseConfig, etl: &EtlConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(2)
        .max_connections(4)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(Duration::from_millis(etl.pool_idle_timeout_ms))
        .connect_with(connect_options(database)?)
        .await
        .context("failed to connect ingestion pool")?;
    Ok(pool)
}
