pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod polymarket;
pub mod services;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::MarketStore;
use crate::ingestion::Pipeline;
use crate::services::HealthMonitor;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketStore>,
    pub pipeline: Arc<Pipeline>,
    pub monitor: HealthMonitor,
    pub config: AppConfig,
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}
