use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row for the markets table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MarketRecord {
    pub id: Uuid,
    pub market_id: String,
    pub question: String,
    pub description: Option<String>,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    pub volume: Decimal,
    pub volume_24h: Decimal,
    pub liquidity: Decimal,
    pub active: bool,
    pub resolved: bool,
    pub outcome: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MarketRecord {
    /// Build the row stored on first sight of a market.
    pub fn from_normalized(market: &NormalizedMarket, run_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            market_id: market.market_id.clone(),
            question: market.question.clone(),
            description: market.description.clone(),
            yes_price: market.yes_price,
            no_price: market.no_price,
            volume: market.volume,
            volume_24h: market.volume_24h,
            liquidity: market.liquidity,
            active: market.active.unwrap_or(true),
            resolved: market.resolved.unwrap_or(false),
            outcome: market.outcome.clone(),
            end_date: market.end_date,
            created_at: run_at,
            updated_at: run_at,
        }
    }

    /// Apply a later sighting of the same market. `None` fields keep the
    /// stored value; volumes and liquidity are always overwritten.
    pub fn apply(&mut self, market: &NormalizedMarket, run_at: DateTime<Utc>) {
        if market.yes_price.is_some() {
            self.yes_price = market.yes_price;
        }
        if market.no_price.is_some() {
            self.no_price = market.no_price;
        }
        self.volume = market.volume;
        self.volume_24h = market.volume_24h;
        self.liquidity = market.liquidity;
        if let Some(active) = market.active {
            self.active = active;
        }
        if let Some(resolved) = market.resolved {
            self.resolved = resolved;
        }
        if market.outcome.is_some() {
            self.outcome = market.outcome.clone();
        }
        self.updated_at = self.updated_at.max(run_at);
    }
}

/// A market payload after normalization, before it touches storage.
///
/// Optional fields distinguish "not reported this cycle" from a concrete
/// value so an update never erases data the API happened to omit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMarket {
    pub market_id: String,
    pub question: String,
    pub description: Option<String>,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    pub volume: Decimal,
    pub volume_24h: Decimal,
    pub liquidity: Decimal,
    pub active: Option<bool>,
    pub resolved: Option<bool>,
    pub outcome: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Row filters understood by `MarketStore::count_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPredicate {
    All,
    Active,
    Resolved,
}

/// Aggregate counts over the markets table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    pub total: i64,
    pub active: i64,
    pub resolved: i64,
}

/// Freshness and counts read together, so a report never mixes two states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub last_update: Option<DateTime<Utc>>,
    pub stats: MarketStats,
}
