use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;

use crate::errors::AppError;
use crate::services::HealthReport;
use crate::AppState;

/// GET /status: machine-readable health snapshot for alerting.
pub async fn snapshot(State(state): State<AppState>) -> Result<Json<HealthReport>, AppError> {
    let report = state.monitor.status().await?;
    Ok(Json(report))
}

/// GET /status/text: the same snapshot rendered for operators.
pub async fn text(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let report = state.monitor.status().await?;
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], report.to_string()))
}
