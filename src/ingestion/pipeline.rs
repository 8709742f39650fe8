use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::db::MarketStore;
use crate::models::NormalizedMarket;
use crate::observability::{EventSink, PipelineEvent};
use crate::polymarket::{FetchError, MarketSource};

use super::fetcher::{fetch_with_retry, RetryPolicy};
use super::filter::filter_crypto_markets;
use super::normalizer::normalize_market;
use super::reconciler::{reconcile, BatchOutcome};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub page_size: u32,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("no markets returned by the API")]
    NoMarkets,

    #[error("batch rolled back after {attempted} records: {error}")]
    RolledBack { attempted: usize, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Succeeded,
    Failed,
}

/// Summary of one fetch → filter → normalize → reconcile cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub run_at: DateTime<Utc>,
    pub status: CycleStatus,
    pub fetched: usize,
    pub matched: usize,
    pub normalized: usize,
    pub stored: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleReport {
    pub fn succeeded(&self) -> bool {
        self.status == CycleStatus::Succeeded
    }
}

#[derive(Debug, Default)]
struct CycleCounts {
    fetched: usize,
    matched: usize,
    normalized: usize,
    stored: usize,
}

/// The ingestion pipeline. At most one cycle runs at a time per instance.
pub struct Pipeline {
    source: Arc<dyn MarketSource>,
    store: Arc<dyn MarketStore>,
    sink: Arc<dyn EventSink>,
    config: PipelineConfig,
    cycle_lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn MarketSource>,
        store: Arc<dyn MarketStore>,
        sink: Arc<dyn EventSink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            config,
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MarketStore> {
        &self.store
    }

    /// Run one cycle. Waits for any cycle already in flight to finish first.
    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;

        let run_at = Utc::now();
        let start = Instant::now();
        self.sink.record(&PipelineEvent::CycleStarted { run_at });

        let mut counts = CycleCounts::default();
        let result = self.execute(run_at, &mut counts).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (status, error) = match result {
            Ok(()) => {
                self.sink.record(&PipelineEvent::CycleSucceeded {
                    stored: counts.stored,
                    duration_ms,
                });
                (CycleStatus::Succeeded, None)
            }
            Err(e) => {
                self.sink.record(&PipelineEvent::CycleFailed {
                    reason: e.to_string(),
                });
                (CycleStatus::Failed, Some(e.to_string()))
            }
        };

        CycleReport {
            run_at,
            status,
            fetched: counts.fetched,
            matched: counts.matched,
            normalized: counts.normalized,
            stored: counts.stored,
            duration_ms,
            error,
        }
    }

    /// Run one cycle on its own task so a panic inside it is recorded as a
    /// failed cycle instead of taking down the caller.
    pub async fn run_guarded(self: &Arc<Self>) -> CycleReport {
        let pipeline = Arc::clone(self);
        let run_at = Utc::now();

        match tokio::spawn(async move { pipeline.run_cycle().await }).await {
            Ok(report) => report,
            Err(e) => {
                let reason = format!("cycle aborted unexpectedly: {e}");
                self.sink.record(&PipelineEvent::CycleFailed {
                    reason: reason.clone(),
                });
                CycleReport {
                    run_at,
                    status: CycleStatus::Failed,
                    fetched: 0,
                    matched: 0,
                    normalized: 0,
                    stored: 0,
                    duration_ms: 0,
                    error: Some(reason),
                }
            }
        }
    }

    async fn execute(
        &self,
        run_at: DateTime<Utc>,
        counts: &mut CycleCounts,
    ) -> Result<(), CycleError> {
        let payloads = fetch_with_retry(
            self.source.as_ref(),
            self.config.page_size,
            self.config.retry,
            self.sink.as_ref(),
        )
        .await?;
        counts.fetched = payloads.len();

        if payloads.is_empty() {
            return Err(CycleError::NoMarkets);
        }

        let crypto = filter_crypto_markets(payloads);
        counts.matched = crypto.len();
        self.sink.record(&PipelineEvent::MarketsFiltered {
            matched: crypto.len(),
            total: counts.fetched,
        });

        if crypto.is_empty() {
            return Ok(());
        }

        let records = self.normalize_all(&crypto);
        counts.normalized = records.len();

        match reconcile(self.store.as_ref(), &records, run_at, self.sink.as_ref()).await {
            BatchOutcome::Committed { written, .. } => {
                counts.stored = written;
                Ok(())
            }
            BatchOutcome::RolledBack { attempted, error } => {
                Err(CycleError::RolledBack { attempted, error })
            }
        }
    }

    /// Normalize each payload, dropping (and reporting) the ones that fail.
    fn normalize_all(&self, payloads: &[serde_json::Value]) -> Vec<NormalizedMarket> {
        payloads
            .iter()
            .filter_map(|payload| match normalize_market(payload) {
                Ok(market) => Some(market),
                Err(e) => {
                    let market_id = payload.get("id").map(|id| match id.as_str() {
                        Some(s) => s.to_string(),
                        None => id.to_string(),
                    });
                    self.sink.record(&PipelineEvent::RecordSkipped {
                        market_id,
                        reason: e.to_string(),
                    });
                    None
                }
            })
            .collect()
    }
}
