pub mod fetcher;
pub mod filter;
pub mod normalizer;
pub mod pipeline;
pub mod reconciler;

pub use fetcher::{fetch_with_retry, RetryPolicy, MAX_RETRIES};
pub use filter::{filter_crypto_markets, is_crypto_market, CRYPTO_KEYWORDS};
pub use normalizer::{normalize_market, NormalizeError};
pub use pipeline::{CycleReport, CycleStatus, Pipeline, PipelineConfig};
pub use reconciler::{reconcile, BatchOutcome};
