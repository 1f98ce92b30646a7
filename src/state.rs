use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::repository::Repository;
use crate::error::AppError;

/// Shared per-worker state. Each serving worker builds its own instance, so
/// connection pools are never shared across workers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Repository,
    pub started_at: Instant,
}

impl AppState {
    pub async fn new(config: Arc<Config>) -> Result<Self, AppError> {
        let repository = Repository::connect(&config).await?;
        Ok(Self {
            config,
            repository,
            started_at: Instant::now(),
        })
    }
}
