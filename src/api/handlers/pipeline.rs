use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::AppState;

/// POST /api/pipeline/run: run one cycle now and report its outcome.
///
/// Queues behind a scheduled cycle if one is in flight.
pub async fn run_cycle(State(state): State<AppState>) -> impl IntoResponse {
    tracing::info!("Pipeline cycle requested via control API");
    let report = state.pipeline.run_guarded().await;

    let status = if report.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(report))
}
