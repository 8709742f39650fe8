use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::market_repo::{MarketStore, RejectedRecord, StoreError, UpsertReport};
use crate::models::{
    MarketPredicate, MarketRecord, MarketStats, NormalizedMarket, PriceHistoryEntry, StoreSummary,
};

/// Process-local market store.
///
/// A batch is applied to a copy of the tables and swapped in at commit, so
/// readers see either the old or the new state. Fault injection hooks let
/// callers rehearse record rejections and commit failures without Postgres.
#[derive(Debug, Default)]
pub struct MemoryMarketStore {
    tables: RwLock<Tables>,
    rejected_ids: Mutex<HashSet<String>>,
    failing_commits: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    markets: HashMap<String, MarketRecord>,
    history: Vec<PriceHistoryEntry>,
    next_history_id: i64,
}

impl Tables {
    fn record_price(&mut self, record: &MarketRecord, recorded_at: DateTime<Utc>) {
        self.next_history_id += 1;
        self.history.push(PriceHistoryEntry {
            id: self.next_history_id,
            market_id: record.market_id.clone(),
            yes_price: record.yes_price,
            no_price: record.no_price,
            volume: record.volume,
            recorded_at,
        });
    }
}

impl MemoryMarketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record in place as-is, bypassing upsert rules.
    pub fn insert_record(&self, record: MarketRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.markets.insert(record.market_id.clone(), record);
        Ok(())
    }

    /// Reject every future upsert of `market_id`.
    pub fn reject_market(&self, market_id: impl Into<String>) {
        if let Ok(mut ids) = self.rejected_ids.lock() {
            ids.insert(market_id.into());
        }
    }

    /// Make the next `count` batch commits fail.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Result<Vec<MarketRecord>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<MarketRecord> = tables.markets.values().cloned().collect();
        rows.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        Ok(rows)
    }

    fn take_commit_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

#[async_trait]
impl MarketStore for MemoryMarketStore {
    async fn find_by_key(&self, market_id: &str) -> Result<Option<MarketRecord>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.markets.get(market_id).cloned())
    }

    async fn upsert(
        &self,
        batch: &[NormalizedMarket],
        run_at: DateTime<Utc>,
    ) -> Result<UpsertReport, StoreError> {
        let rejected_ids = self.rejected_ids.lock().map_err(poisoned)?.clone();
        let mut tables = self.tables.write().map_err(poisoned)?;
        let mut working = tables.clone();
        let mut report = UpsertReport::default();

        for market in batch {
            let reason = if market.market_id.is_empty() {
                Some("empty market_id")
            } else if rejected_ids.contains(&market.market_id) {
                Some("rejected by store")
            } else {
                None
            };
            if let Some(reason) = reason {
                report.rejected.push(RejectedRecord {
                    market_id: market.market_id.clone(),
                    reason: reason.into(),
                });
                continue;
            }

            let stored = working
                .markets
                .entry(market.market_id.clone())
                .and_modify(|existing| existing.apply(market, run_at))
                .or_insert_with(|| MarketRecord::from_normalized(market, run_at))
                .clone();
            working.record_price(&stored, run_at);
            report.written += 1;
        }

        if self.take_commit_failure() {
            return Err(StoreError::Commit("injected commit failure".into()));
        }

        *tables = working;
        Ok(report)
    }

    async fn most_recently_updated(&self) -> Result<Option<MarketRecord>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.markets.values().max_by_key(|m| m.updated_at).cloned())
    }

    async fn count_by(&self, predicate: MarketPredicate) -> Result<i64, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let count = tables
            .markets
            .values()
            .filter(|m| match predicate {
                MarketPredicate::All => true,
                MarketPredicate::Active => m.active,
                MarketPredicate::Resolved => m.resolved,
            })
            .count();
        Ok(count as i64)
    }

    async fn list_markets(
        &self,
        active_only: bool,
        limit: i64,
    ) -> Result<Vec<MarketRecord>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<MarketRecord> = tables
            .markets
            .values()
            .filter(|m| m.active || !active_only)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn price_history(
        &self,
        market_id: &str,
        limit: i64,
    ) -> Result<Vec<PriceHistoryEntry>, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables
            .history
            .iter()
            .rev()
            .filter(|h| h.market_id == market_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    /// Read under one guard so a concurrent commit cannot split the summary.
    async fn summary(&self) -> Result<StoreSummary, StoreError> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut stats = MarketStats::default();
        for m in tables.markets.values() {
            stats.total += 1;
            stats.active += i64::from(m.active);
            stats.resolved += i64::from(m.resolved);
        }

        Ok(StoreSummary {
            last_update: tables.markets.values().map(|m| m.updated_at).max(),
            stats,
        })
    }
}
