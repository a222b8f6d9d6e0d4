//! C13 — Position & history services, plus the per-ticker advisory lock
//! spec §5 requires so a buy and sell tick for the same ticker never
//! interleave inside one operation.
//!
//! Grounded on `signals/enrichment.rs`'s semaphore-gated worker pattern,
//! generalized from "bound concurrency" to "mutually exclude one key":
//! a lazily-created `tokio::sync::Mutex` per ticker code, tried with
//! `try_lock` so a contended tick drops instead of queuing (spec §5:
//! "if contended, the later one drops").

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::store::entities::{CodeDateKey, TradeHistory, TradeHistoryType, TradeStatus};
use crate::store::SnapshotStore;

pub struct TickerLocks {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TickerLocks {
    pub fn new() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    /// Attempts to acquire the advisory lock for `code`. Returns `None`
    /// when another operation already holds it for this ticker.
    pub fn try_acquire(&self, code: &str) -> Option<OwnedMutexGuard<()>> {
        let mutex = {
            let mut map = self.locks.lock();
            map.entry(code.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        mutex.try_lock_owned().ok()
    }
}

impl Default for TickerLocks {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PositionService {
    store: Arc<SnapshotStore>,
}

impl PositionService {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    pub async fn today_status(&self, code: &str, session_date: &str) -> Result<Option<TradeStatus>> {
        Ok(self
            .store
            .trade_status(CodeDateKey {
                code: code.to_string(),
                session_date: session_date.to_string(),
            })
            .await?)
    }

    pub async fn is_held(&self, code: &str, session_date: &str) -> Result<bool> {
        Ok(self
            .today_status(code, session_date)
            .await?
            .map(|s| s.direction == "BS")
            .unwrap_or(false))
    }

    pub async fn holdings_count(&self, session_date: &str) -> Result<usize> {
        Ok(self.store.bought_held_positions(session_date).await?.len())
    }

    pub async fn upsert_status(&self, status: TradeStatus) -> Result<()> {
        Ok(self.store.upsert_trade_status(status).await?)
    }

    pub async fn already_bought_today(&self, code: &str, session_date: &str) -> Result<bool> {
        Ok(self
            .store
            .trade_history_exists(code, session_date, TradeHistoryType::BuySubmitted.wire())
            .await?)
    }

    pub async fn append_history(&self, entry: TradeHistory) -> Result<()> {
        Ok(self.store.append_trade_history(entry).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn contended_lock_drops_instead_of_blocking() {
        let locks = TickerLocks::new();
        let first = locks.try_acquire("005930").expect("first caller gets the lock");
        assert!(locks.try_acquire("005930").is_none());
        drop(first);
        assert!(locks.try_acquire("005930").is_some());
    }

    #[tokio::test]
    async fn distinct_tickers_do_not_contend() {
        let locks = TickerLocks::new();
        let _a = locks.try_acquire("005930").unwrap();
        assert!(locks.try_acquire("000660").is_some());
    }

    #[tokio::test]
    async fn already_bought_today_reflects_history() {
        let store = Arc::new(SnapshotStore::in_memory().unwrap());
        let svc = PositionService::new(store);
        assert!(!svc.already_bought_today("005930", "20260101").await.unwrap());
        svc.append_history(TradeHistory {
            code: "005930".to_string(),
            session_date: "20260101".to_string(),
            trade_time: "093000".to_string(),
            entry_type: "B".to_string(),
            qty: 1,
            price: 1000,
            note: String::new(),
        })
        .await
        .unwrap();
        assert!(svc.already_bought_today("005930", "20260101").await.unwrap());
    }
}
