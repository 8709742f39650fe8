use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database row for the price_history table. One row per market per
/// successful write, taken from the stored state after the upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub market_id: String,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    pub volume: Decimal,
    pub recorded_at: DateTime<Utc>,
}
