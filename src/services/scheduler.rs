use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ingestion::Pipeline;

/// Default spacing between scheduled cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run the pipeline now and then every `period` until `cancel` fires.
///
/// Cancellation is only observed between cycles: a cycle that has started
/// always runs to commit or rollback. Ticks that fall due while a cycle is
/// still running are delayed, never overlapped. Returns the number of cycles
/// executed.
pub async fn run_scheduler(
    pipeline: Arc<Pipeline>,
    period: Duration,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = period.as_secs(),
        "Pipeline scheduler started"
    );

    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(cycles, "Pipeline scheduler stopped");
                break;
            }
            _ = ticker.tick() => {}
        }

        let report = pipeline.run_guarded().await;
        cycles += 1;

        if report.succeeded() {
            tracing::info!(
                stored = report.stored,
                matched = report.matched,
                fetched = report.fetched,
                "Scheduled cycle completed"
            );
        } else {
            tracing::warn!(
                error = report.error.as_deref().unwrap_or("unknown"),
                "Scheduled cycle failed, will retry next interval"
            );
        }
    }

    cycles
}
