use chrono::{DateTime, Utc};

use crate::db::MarketStore;
use crate::models::NormalizedMarket;
use crate::observability::{EventSink, PipelineEvent};

/// What happened to one batch handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Committed { written: usize, skipped: usize },
    RolledBack { attempted: usize, error: String },
}

impl BatchOutcome {
    /// Records that made it into storage; zero when the batch rolled back.
    pub fn stored(&self) -> usize {
        match self {
            BatchOutcome::Committed { written, .. } => *written,
            BatchOutcome::RolledBack { .. } => 0,
        }
    }
}

/// Upsert a batch of normalized markets. Never fails: per-record rejections
/// are reported as skipped, a failed commit as a rollback.
pub async fn reconcile(
    store: &dyn MarketStore,
    records: &[NormalizedMarket],
    run_at: DateTime<Utc>,
    sink: &dyn EventSink,
) -> BatchOutcome {
    if records.is_empty() {
        tracing::warn!("No crypto markets to store");
        return BatchOutcome::Committed {
            written: 0,
            skipped: 0,
        };
    }

    match store.upsert(records, run_at).await {
        Ok(report) => {
            for rejected in &report.rejected {
                sink.record(&PipelineEvent::RecordSkipped {
                    market_id: Some(rejected.market_id.clone()),
                    reason: rejected.reason.clone(),
                });
            }
            tracing::info!(
                written = report.written,
                skipped = report.rejected.len(),
                "Stored/updated markets"
            );
            BatchOutcome::Committed {
                written: report.written,
                skipped: report.rejected.len(),
            }
        }
        Err(e) => {
            sink.record(&PipelineEvent::CommitFailed {
                attempted: records.len(),
                error: e.to_string(),
            });
            BatchOutcome::RolledBack {
                attempted: records.len(),
                error: e.to_string(),
            }
        }
    }
}
