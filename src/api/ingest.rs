use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::ingest::orchestrator;
use crate::models::{IngestRequest, IngestResponse};
use crate::state::AppState;

/// POST /api/v1/ingest - operator-triggered ingestion of one extract file.
///
/// Runs in an isolate with its own pool; this handler only awaits the
/// completion message, so the worker keeps serving searches throughout.
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, AppError> {
    let file_path = request
        .file_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("filePath is required".to_string()))?;

    let report = orchestrator::run_ingestion(
        file_path,
        state.config.database.clone(),
        state.config.etl.clone(),
    )
    .await?;

    Ok(Json(IngestResponse {
        status: "success",
        data: report,
    }))
}
