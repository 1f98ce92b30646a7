//! HTTP surface: router assembly and the per-request timing/logging layer.

pub mod businesses;
pub mod ingest;
pub mod search;

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(businesses::health))
        .route("/api/v1/businesses/search", get(search::search))
        .route("/api/v1/businesses/{abn}", get(businesses::get_by_abn))
        .route("/api/v1/ingest", post(ingest::ingest))
        .layer(middleware::from_fn(track_request))
        .with_state(state)
}

/// Structured request log with wall-clock latency.
async fn track_request(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!(
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    response
}
