use std::time::Instant;

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

use crate::error::AppError;
use crate::models::{BusinessResponse, HealthResponse, Meta};
use crate::state::AppState;

/// GET /api/v1/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /api/v1/businesses/:abn - lookup by natural key
pub async fn get_by_abn(
    State(state): State<AppState>,
    Path(abn): Path<String>,
) -> Result<Json<BusinessResponse>, AppError> {
    let started = Instant::now();

    let (business, query_time_ms) = state.repository.find_by_abn(&abn).await?;

    match business {
        Some(business) => Ok(Json(BusinessResponse {
            status: "success",
            data: business,
            meta: Meta {
                query_time_ms,
                total_time_ms: started.elapsed().as_millis() as u64,
            },
        })),
        None => Err(AppError::NotFound(format!("Business not found: {abn}"))),
    }
}
