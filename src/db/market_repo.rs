use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use crate::models::{
    MarketPredicate, MarketRecord, MarketStats, NormalizedMarket, PriceHistoryEntry, StoreSummary,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A record the store refused while processing a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub market_id: String,
    pub reason: String,
}

/// Result of a committed batch upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub written: usize,
    pub rejected: Vec<RejectedRecord>,
}

/// Persistence for market records keyed by `market_id`.
///
/// `upsert` applies a whole batch atomically: a rejected record is skipped
/// and reported, but an `Err` means nothing from the batch was kept. Every
/// written record also gets a price history entry in the same batch.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn find_by_key(&self, market_id: &str) -> Result<Option<MarketRecord>, StoreError>;

    async fn upsert(
        &self,
        batch: &[NormalizedMarket],
        run_at: DateTime<Utc>,
    ) -> Result<UpsertReport, StoreError>;

    async fn most_recently_updated(&self) -> Result<Option<MarketRecord>, StoreError>;

    async fn count_by(&self, predicate: MarketPredicate) -> Result<i64, StoreError>;

    /// Most recently updated first, ties broken by `market_id`.
    async fn list_markets(
        &self,
        active_only: bool,
        limit: i64,
    ) -> Result<Vec<MarketRecord>, StoreError>;

    /// Newest entries first.
    async fn price_history(
        &self,
        market_id: &str,
        limit: i64,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError>;

    async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let last_update = self.most_recently_updated().await?.map(|r| r.updated_at);
        Ok(StoreSummary {
            last_update,
            stats: self.stats().await?,
        })
    }

    async fn stats(&self) -> Result<MarketStats, StoreError> {
        Ok(MarketStats {
            total: self.count_by(MarketPredicate::All).await?,
            active: self.count_by(MarketPredicate::Active).await?,
            resolved: self.count_by(MarketPredicate::Resolved).await?,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgMarketStore {
    pool: PgPool,
}

impl PgMarketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgMarketStore {
    async fn find_by_key(&self, market_id: &str) -> Result<Option<MarketRecord>, StoreError> {
        let row = sqlx::query_as::<_, MarketRecord>("SELECT * FROM markets WHERE market_id = $1")
            .bind(market_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    /// One transaction per batch, one savepoint per record so a failing row
    /// does not poison the rest of the transaction.
    async fn upsert(
        &self,
        batch: &[NormalizedMarket],
        run_at: DateTime<Utc>,
    ) -> Result<UpsertReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut report = UpsertReport::default();

        for market in batch {
            sqlx::query("SAVEPOINT market_upsert")
                .execute(&mut *tx)
                .await?;

            match upsert_market(&mut tx, market, run_at).await {
                Ok(()) => {
                    sqlx::query("RELEASE SAVEPOINT market_upsert")
                        .execute(&mut *tx)
                        .await?;
                    report.written += 1;
                }
                Err(e) => {
                    sqlx::query("ROLLBACK TO SAVEPOINT market_upsert")
                        .execute(&mut *tx)
                        .await?;
                    report.rejected.push(RejectedRecord {
                        market_id: market.market_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Commit(e.to_string()))?;

        Ok(report)
    }

    async fn most_recently_updated(&self) -> Result<Option<MarketRecord>, StoreError> {
        let row = sqlx::query_as::<_, MarketRecord>(
            "SELECT * FROM markets ORDER BY updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn count_by(&self, predicate: MarketPredicate) -> Result<i64, StoreError> {
        let sql = match predicate {
            MarketPredicate::All => "SELECT COUNT(*) FROM markets",
            MarketPredicate::Active => "SELECT COUNT(*) FROM markets WHERE active",
            MarketPredicate::Resolved => "SELECT COUNT(*) FROM markets WHERE resolved",
        };
        let (count,): (i64,) = sqlx::query_as(sql).fetch_one(&self.pool).await?;

        Ok(count)
    }

    /// All counts from a single statement, so they agree with each other.
    async fn stats(&self) -> Result<MarketStats, StoreError> {
        let (total, active, resolved): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE active),
                   COUNT(*) FILTER (WHERE resolved)
            FROM markets
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(MarketStats {
            total,
            active,
            resolved,
        })
    }

    async fn list_markets(
        &self,
        active_only: bool,
        limit: i64,
    ) -> Result<Vec<MarketRecord>, StoreError> {
        let rows = sqlx::query_as::<_, MarketRecord>(
            r#"
            SELECT * FROM markets
            WHERE active OR NOT $1
            ORDER BY updated_at DESC, market_id
            LIMIT $2
            "#,
        )
        .bind(active_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn price_history(
        &self,
        market_id: &str,
        limit: i64,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, PriceHistoryEntry>(
            r#"
            SELECT * FROM price_history
            WHERE market_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(market_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let (last_update, total, active, resolved): (Option<DateTime<Utc>>, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT MAX(updated_at),
                       COUNT(*),
                       COUNT(*) FILTER (WHERE active),
                       COUNT(*) FILTER (WHERE resolved)
                FROM markets
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreSummary {
            last_update,
            stats: MarketStats {
                total,
                active,
                resolved,
            },
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Insert on first sight; on conflict overwrite prices, volumes and lifecycle
/// fields, keeping stored values where this cycle reported nothing. Then
/// snapshot the stored prices into price_history.
async fn upsert_market(
    tx: &mut Transaction<'_, Postgres>,
    market: &NormalizedMarket,
    run_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO markets (market_id, question, description, yes_price, no_price,
                             volume, volume_24h, liquidity, active, resolved, outcome,
                             end_date, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $13,
                COALESCE($8::BOOLEAN, TRUE), COALESCE($9::BOOLEAN, FALSE),
                $10, $11, $12, $12)
        ON CONFLICT (market_id) DO UPDATE
        SET yes_price = COALESCE($4, markets.yes_price),
            no_price = COALESCE($5, markets.no_price),
            volume = $6,
            volume_24h = $7,
            liquidity = $13,
            active = COALESCE($8::BOOLEAN, markets.active),
            resolved = COALESCE($9::BOOLEAN, markets.resolved),
            outcome = COALESCE($10, markets.outcome),
            updated_at = GREATEST(markets.updated_at, $12)
        "#,
    )
    .bind(&market.market_id)
    .bind(&market.question)
    .bind(&market.description)
    .bind(market.yes_price)
    .bind(market.no_price)
    .bind(market.volume)
    .bind(market.volume_24h)
    .bind(market.active)
    .bind(market.resolved)
    .bind(&market.outcome)
    .bind(market.end_date)
    .bind(run_at)
    .bind(market.liquidity)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO price_history (market_id, yes_price, no_price, volume, recorded_at)
        SELECT market_id, yes_price, no_price, volume, $2
        FROM markets
        WHERE market_id = $1
        "#,
    )
    .bind(&market.market_id)
    .bind(run_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
