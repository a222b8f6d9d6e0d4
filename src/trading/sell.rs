//! C11 — Sell task.
//!
//! One intraday tick (spec §4.9): walk today's bought-and-held positions,
//! refresh quotes and pivots, and place a full-position limit sell once
//! the trailing-stop or loss-cut rule fires.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::adapter::BrokerAdapter;
use crate::broker::types::OrderSide;
use crate::clock;
use crate::config::Config;
use crate::notify::Notifier;
use crate::pivot::nonzero_level;
use crate::position::{PositionService, TickerLocks};
use crate::store::entities::{CodeDateKey, TradeHistory, TradeHistoryType, TradeStatus};
use crate::store::SnapshotStore;
use crate::trading::{fill_open_from_daily_series, mean_of_present};

pub struct SellTask {
    store: Arc<SnapshotStore>,
    adapter: Arc<BrokerAdapter>,
    positions: Arc<PositionService>,
    locks: Arc<TickerLocks>,
    notifier: Arc<Notifier>,
    cfg: Arc<Config>,
    dry_run: bool,
}

impl SellTask {
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
        let held = self.store.bought_held_positions(&today).await?;

        let mut sold = 0;
        for status in held {
            let Some(_guard) = self.locks.try_acquire(&status.code) else {
                continue;
            };
            match self.evaluate_position(&status, &today).await {
                Ok(true) => sold += 1,
                Ok(false) => {}
                Err(e) => warn!(code = %status.code, error = %e, "sell task: position failed"),
            }
        }

        info!(session_date = %today, sold, "sell task tick complete");
        Ok(())
    }

    /// Returns `Ok(true)` when a sell order was placed.
    async fn evaluate_position(&self, status: &TradeStatus, today: &str) -> anyhow::Result<bool> {
        let mut quote = self.adapter.spot_quote(&status.code).await?;
        if quote.current == 0 {
            return Ok(false);
        }
        fill_open_from_daily_series(&self.adapter, &status.code, &mut quote).await?;

        let key = CodeDateKey {
            code: status.code.clone(),
            session_date: today.to_string(),
        };
        self.store.update_trade_info_price(key.clone(), quote.open, quote.current).await?;

        let bought = status.avg_price;
        if bought <= 0 {
            return Ok(false);
        }
        let profit = (((quote.current - bought) as f64 / bought as f64) * 100.0 * 100.0).round() / 100.0;
        info!(code = %status.code, profit, "sell task: current position profit");

        if !self.cfg.sell_test_force_sell {
            let notional = status.qty as f64 * bought as f64;
            if notional < self.cfg.trading_limit_price as f64 * self.cfg.sell_hold_rate {
                return Ok(false);
            }

            let info = self.store.get_trade_info(key.clone()).await?.unwrap_or_default();
            let stop = nonzero_level(info.s1).unwrap_or_else(|| mean_of_present(&[nonzero_level(info.s2), nonzero_level(info.s3)]).unwrap_or(0));

            let trailing_stop_hit = profit >= self.cfg.sell_up_rate && (stop == 0 || quote.current < stop);
            let loss_cut_hit = self.cfg.sell_use_loss_cut && profit <= self.cfg.sell_down_rate;

            if !trailing_stop_hit && !loss_cut_hit {
                return Ok(false);
            }
        }

        if self.dry_run {
            info!(code = %status.code, qty = status.qty, price = quote.current, "sell task: dry run, order not placed");
            return Ok(false);
        }

        let result = self.adapter.place_order(OrderSide::Sell, &status.code, status.qty, quote.current).await?;
        if !result.success {
            warn!(code = %status.code, msg1 = %result.msg1, "sell task: broker rejected order");
            return Ok(false);
        }

        self.positions
            .upsert_status(TradeStatus {
                code: status.code.clone(),
                session_date: today.to_string(),
                direction: "SS".to_string(),
                odno: result.odno.clone().unwrap_or_default(),
                qty: status.qty,
                avg_price: quote.current,
                trade_time: clock::wall_time(),
            })
            .await?;
        self.positions
            .append_history(TradeHistory {
                code: status.code.clone(),
                session_date: today.to_string(),
                trade_time: clock::wall_time(),
                entry_type: TradeHistoryType::SellFilled.wire().to_string(),
                qty: status.qty,
                price: quote.current,
                note: format!("profit={profit}"),
            })
            .await?;
        self.notifier
            .notify(format!("SELL {} qty={} price={} profit={profit}%", status.code, status.qty, quote.current))
            .await;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profit_rounds_to_two_decimals() {
        let bought = 10000i64;
        let current = 11500i64;
        let profit = (((current - bought) as f64 / bought as f64) * 100.0 * 100.0).round() / 100.0;
        assert_eq!(profit, 15.0);
    }
}
