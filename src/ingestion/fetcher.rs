use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;

use crate::observability::{EventSink, PipelineEvent};
use crate::polymarket::{FetchError, MarketSource};

/// Attempts per logical fetch.
pub const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: BASE_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wait after the 0-indexed `attempt` failed: `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Fetch one page of markets, retrying only connection failures and timeouts.
///
/// Non-transient errors return immediately. After the last transient failure
/// the result is `FetchError::RetriesExhausted`.
pub async fn fetch_with_retry(
    source: &dyn MarketSource,
    page_size: u32,
    policy: RetryPolicy,
    sink: &dyn EventSink,
) -> Result<Vec<Value>, FetchError> {
    let max_attempts = policy.max_attempts.max(1);

    let mut attempt = 0;

    loop {
        let number = attempt + 1;
        sink.record(&PipelineEvent::AttemptStarted {
            attempt: number,
            max_attempts,
        });

        let err = match source.fetch_page(page_size).await {
            Ok(markets) => {
                sink.record(&PipelineEvent::AttemptSucceeded {
                    attempt: number,
                    markets: markets.len(),
                });
                return Ok(markets);
            }
            Err(e) => e,
        };

        let retryable = err.is_transient();
        sink.record(&PipelineEvent::AttemptFailed {
            attempt: number,
            max_attempts,
            retryable,
            error: err.to_string(),
        });

        if !retryable {
            return Err(err);
        }

        if number == max_attempts {
            sink.record(&PipelineEvent::FetchExhausted {
                attempts: max_attempts,
            });
            return Err(FetchError::RetriesExhausted {
                attempts: max_attempts,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_for(attempt);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
        sleep(delay).await;
        attempt += 1;
    }
}
