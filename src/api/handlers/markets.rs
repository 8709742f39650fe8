use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::models::{MarketRecord, PriceHistoryEntry};
use crate::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;
pub const HISTORY_LIMIT: i64 = 50;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub active_only: bool,
    pub limit: Option<i64>,
}

impl ListParams {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// A stored market with its most recent price snapshots, newest first.
#[derive(Debug, Serialize)]
pub struct MarketDetail {
    pub market: MarketRecord,
    pub price_history: Vec<PriceHistoryEntry>,
}

/// GET /markets?active_only=&limit=
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<ApiResponse<Vec<MarketRecord>>> {
    match state
        .store
        .list_markets(params.active_only, params.limit())
        .await
    {
        Ok(markets) => Json(ApiResponse {
            success: true,
            data: Some(markets),
            error: None,
        }),
        Err(e) => Json(ApiResponse {
            success: false,
            data: None,
            error: Some(e.to_string()),
        }),
    }
}

/// GET /markets/:market_id
pub async fn detail(
    State(state): State<AppState>,
    Path(market_id): Path<String>,
) -> Result<Json<ApiResponse<MarketDetail>>, StatusCode> {
    let market = match state.store.find_by_key(&market_id).await {
        Ok(Some(market)) => market,
        Ok(None) => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(market_id = %market_id, error = %e, "Market lookup failed");
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    match state.store.price_history(&market_id, HISTORY_LIMIT).await {
        Ok(price_history) => Ok(Json(ApiResponse {
            success: true,
            data: Some(MarketDetail {
                market,
                price_history,
            }),
            error: None,
        })),
        Err(e) => {
            tracing::error!(market_id = %market_id, error = %e, "Price history lookup failed");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
