//! C10 — Buy task.
//!
//! One intraday tick (spec §4.8): reconcile account positions into the
//! store, then walk today's candidate set in JOIN order and place limit
//! buys against tickers whose support levels the current price has
//! dropped beneath. Grounded on `signals/enrichment.rs`'s per-item
//! try/warn/continue loop shape for bounded, resilient fan-out.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::adapter::BrokerAdapter;
use crate::broker::types::OrderSide;
use crate::clock;
use crate::config::Config;
use crate::notify::Notifier;
use crate::pivot::{self, PivotEngine};
use crate::position::{PositionService, TickerLocks};
use crate::store::entities::{Candidate, CodeDateKey, TradeHistory, TradeHistoryType, TradeStatus};
use crate::store::SnapshotStore;
use crate::trading::{fill_open_from_daily_series, mean_of_present};

pub struct BuyTask {
    store: Arc<SnapshotStore>,
    adapter: Arc<BrokerAdapter>,
    positions: Arc<PositionService>,
    locks: Arc<TickerLocks>,
    pivots: PivotEngine,
    notifier: Arc<Notifier>,
    cfg: Arc<Config>,
    dry_run: bool,
}

impl BuyTask {
    pub fn new(
        store: Arc<SnapshotStore>,
        adapter: Arc<BrokerAdapter>,
        positions: Arc<PositionService>,
        locks: Arc<TickerLocks>,
        notifier: Arc<Notifier>,
        cfg: Arc<Config>,
        dry_run: bool,
    ) -> Self {
        Self {
            pivots: PivotEngine::new(store.clone()),
            store,
            adapter,
            positions,
            locks,
            notifier,
            cfg,
            dry_run,
        }
    }

    pub async fn run_once(&self) -> anyhow::Result<()> {
        let today = clock::today();

        let balance = match self.adapter.account_balance().await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "buy task: failed to read account balance");
                return Ok(());
            }
        };
        let effective_cash = balance.effective_cash();
        if effective_cash == 0 {
            return Ok(());
        }

        for row in &balance.positions {
            if let Err(e) = self.reconcile_position(row, &today).await {
                warn!(code = %row.code, error = %e, "buy task: failed to reconcile position");
            }
        }

        if !self.cfg.buy_use_yn {
            return Ok(());
        }

        let candidates = self.store.swing_candidates(&today).await?;
        let mut placed = 0;
        for candidate in candidates {
            let Some(_guard) = self.locks.try_acquire(&candidate.code) else {
                continue;
            };
            match self.try_buy(&candidate.code, &today, effective_cash).await {
                Ok(true) => placed += 1,
                Ok(false) => {}
                Err(e) => warn!(code = %candidate.code, error = %e, "buy task: candidate failed"),
            }
        }

        info!(session_date = %today, placed, "buy task tick complete");
        Ok(())
    }

    async fn reconcile_position(
        &self,
        row: &crate::broker::adapter::PositionRow,
        today: &str,
    ) -> anyhow::Result<()> {
        let key = CodeDateKey {
            code: row.code.clone(),
            session_date: today.to_string(),
        };

        if row.purchase_amount > 0 {
            self.positions
                .upsert_status(TradeStatus {
                    code: row.code.clone(),
                    session_date: today.to_string(),
                    direction: "BS".to_string(),
                    odno: String::new(),
                    qty: row.hold_qty,
                    avg_price: row.purchase_avg_price,
                    trade_time: clock::wall_time(),
                })
                .await?;

            let notional = row.hold_qty * row.purchase_avg_price;
            let (candidate, note) = if notional > self.cfg.trading_limit_price {
                (Candidate::No, "swing bought item(buy-stop)")
            } else {
                (Candidate::Yes, "swing bought item")
            };
            self.store.set_trade_info_candidate(key, candidate, note.to_string()).await?;
        } else {
            self.positions
                .upsert_status(TradeStatus {
                    code: row.code.clone(),
                    session_date: today.to_string(),
                    direction: "SS".to_string(),
                    odno: String::new(),
                    qty: row.hold_qty,
                    avg_price: row.purchase_avg_price,
                    trade_time: clock::wall_time(),
                })
                .await?;
        }
        Ok(())
    }

    /// Returns `Ok(true)` when an order was placed.
    async fn try_buy(&self, code: &str, today: &str, effective_cash: i64) -> anyhow::Result<bool> {
        let holdings_count = self.positions.holdings_count(today).await?;
        let already_held = self.positions.is_held(code, today).await?;
        if holdings_count >= self.cfg.trading_limit_cnt as usize && !already_held {
            return Ok(false);
        }

        let mut quote = self.adapter.spot_quote(code).await?;
        if quote.current == 0 {
            return Ok(false);
        }
        fill_open_from_daily_series(&self.adapter, code, &mut quote).await?;

        let key = CodeDateKey {
            code: code.to_string(),
            session_date: today.to_string(),
        };
        self.store
            .update_trade_info_price(key.clone(), quote.open, quote.current)
            .await?;

        let levels = self.pivots.recompute(code, today, quote.open, quote.high, quote.low).await?;

        if self.positions.already_bought_today(code, today).await? {
            return Ok(false);
        }

        let target = match mean_of_present(&[nonzero(levels.s1), nonzero(levels.s2), nonzero(levels.s3)]) {
            Some(t) if t > 0 => t,
            _ => return Ok(false),
        };
        let resistance_avg = mean_of_present(&[nonzero(levels.r1), nonzero(levels.r2), nonzero(levels.r3)]);

        if !self.cfg.buy_test_force_buy && quote.current >= target {
            return Ok(false);
        }

        let alloc = effective_cash as f64 * self.cfg.trading_contract_rate;
        let mut qty = (alloc / quote.current as f64) as i64;
        if qty == 0 && effective_cash >= quote.current {
            qty = 1;
        }
        if qty == 0 {
            return Ok(false);
        }

        info!(
            code,
            target,
            resistance_avg = resistance_avg.unwrap_or(0),
            current = quote.current,
            qty,
            "buy task: placing limit buy"
        );

        if self.dry_run {
            info!(code, qty, price = quote.current, "buy task: dry run, order not placed");
            return Ok(false);
        }

        let result = self.adapter.place_order(OrderSide::Buy, code, qty, quote.current).await?;
        if !result.success {
            warn!(code, msg1 = %result.msg1, "buy task: broker rejected order");
            return Ok(false);
        }

        let odno = result.odno.unwrap_or_default();
        self.positions
            .upsert_status(TradeStatus {
                code: code.to_string(),
                session_date: today.to_string(),
                direction: "BS".to_string(),
                odno: odno.clone(),
                qty,
                avg_price: quote.current,
                trade_time: clock::wall_time(),
            })
            .await?;
        self.positions
            .append_history(TradeHistory {
                code: code.to_string(),
                session_date: today.to_string(),
                trade_time: clock::wall_time(),
                entry_type: TradeHistoryType::BuySubmitted.wire().to_string(),
                qty,
                price: quote.current,
                note: format!("swing buy odno={odno}"),
            })
            .await?;
        self.notifier
            .notify(format!("BUY {code} qty={qty} price={price}", price = quote.current))
            .await;

        Ok(true)
    }
}

/// `compute_pivots` encodes "not computed" as `0` for the extended levels
/// when today's open is absent (spec §4.7); treat that the same way the
/// buy/sell target computations treat a missing pivot.
fn nonzero(v: i64) -> Option<i64> {
    pivot::nonzero_level(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonzero_treats_zero_as_absent() {
        assert_eq!(nonzero(0), None);
        assert_eq!(nonzero(8900), Some(8900));
    }
}
