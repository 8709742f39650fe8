use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use super::auth::require_auth;
use super::handlers;

pub fn create_router(state: AppState) -> Router {
    // Read-only routes, no authentication required
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render))
        .route("/status", get(handlers::status::snapshot))
        .route("/status/text", get(handlers::status::text))
        .route("/markets", get(handlers::markets::list))
        .route("/markets/:market_id", get(handlers::markets::detail));

    // Control routes require a Bearer token when API_TOKEN is set
    let protected = Router::new()
        .route("/api/pipeline/run", post(handlers::pipeline::run_cycle))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
