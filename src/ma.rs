//! Moving-average engine: turns a ticker's price history into the 8
//! moving-average fields carried on each bar.
//!
//! Bars are consumed newest-first (as the store hands them back) and each
//! window looks forward by index — toward older bars — from the bar being
//! computed. A zero close is treated the same way the numeric coercion
//! helpers treat an unparsable or absent value: excluded from both the sum
//! and the divisor, so a short run of bad data doesn't zero out an entire
//! average. When fewer than `window` bars remain, the mean is taken over
//! whatever is available (a partial mean), matching how the brokerage's
//! own chart endpoints behave near the start of a series.

use anyhow::Result;
use std::sync::Arc;

use crate::store::entities::PriceBar;
use crate::store::SnapshotStore;

pub const WINDOWS: [usize; 8] = [5, 10, 20, 30, 60, 120, 200, 240];

pub struct MovingAverageEngine {
    store: Arc<SnapshotStore>,
}

impl MovingAverageEngine {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Recomputes and idempotently writes back all 8 moving averages for
    /// one ticker.
    pub async fn recompute(&self, code: &str) -> Result<()> {
        let bars = self.store.price_bars_newest_first(code).await?;
        let updated = compute_moving_averages(&bars);
        for bar in updated {
            self.store.upsert_price_bar(bar).await?;
        }
        Ok(())
    }
}

/// Pure computation: given bars newest-first, returns bars (same order,
/// same length) with all 8 `ma*` fields filled in.
pub fn compute_moving_averages(bars_newest_first: &[PriceBar]) -> Vec<PriceBar> {
    let mut out = Vec::with_capacity(bars_newest_first.len());
    for (i, bar) in bars_newest_first.iter().enumerate() {
        let mut updated = bar.clone();
        for &window in &WINDOWS {
            let mean = windowed_mean(bars_newest_first, i, window);
            assign_window(&mut updated, window, mean);
        }
        out.push(updated);
    }
    out
}

fn windowed_mean(bars: &[PriceBar], start: usize, window: usize) -> f64 {
    let end = (start + window).min(bars.len());
    let mut sum = 0.0;
    let mut count = 0usize;
    for bar in &bars[start..end] {
        if bar.close != 0 {
            sum += bar.close as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn assign_window(bar: &mut PriceBar, window: usize, mean: f64) {
    match window {
        5 => bar.ma5 = mean,
        10 => bar.ma10 = mean,
        20 => bar.ma20 = mean,
        30 => bar.ma30 = mean,
        60 => bar.ma60 = mean,
        120 => bar.ma120 = mean,
        200 => bar.ma200 = mean,
        240 => bar.ma240 = mean,
        _ => unreachable!("window set is fixed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: i64) -> PriceBar {
        PriceBar {
            code: "005930".to_string(),
            session_date: date.to_string(),
            close,
            ..Default::default()
        }
    }

    #[test]
    fn full_window_average_matches_simple_mean() {
        let bars = vec![
            bar("20260105", 110),
            bar("20260104", 100),
            bar("20260103", 90),
            bar("20260102", 80),
            bar("20260101", 70),
        ];
        let out = compute_moving_averages(&bars);
        assert_eq!(out[0].ma5, (110 + 100 + 90 + 80 + 70) as f64 / 5.0);
    }

    #[test]
    fn partial_window_averages_over_available_bars_only() {
        let bars = vec![bar("20260102", 120), bar("20260101", 100)];
        let out = compute_moving_averages(&bars);
        assert_eq!(out[0].ma5, (120 + 100) as f64 / 2.0);
        assert_eq!(out[1].ma5, 100.0);
    }

    #[test]
    fn zero_close_excluded_from_sum_and_divisor() {
        let bars = vec![bar("20260103", 100), bar("20260102", 0), bar("20260101", 200)];
        let out = compute_moving_averages(&bars);
        assert_eq!(out[0].ma5, (100.0 + 200.0) / 2.0);
    }

    #[test]
    fn all_zero_window_yields_zero_mean_without_dividing_by_zero() {
        let bars = vec![bar("20260101", 0)];
        let out = compute_moving_averages(&bars);
        assert_eq!(out[0].ma5, 0.0);
    }

    #[test]
    fn newest_bar_keeps_shortest_lookback_window() {
        let bars = vec![bar("20260103", 30), bar("20260102", 20), bar("20260101", 10)];
        let out = compute_moving_averages(&bars);
        // index 0 is the newest bar; window forward covers indices 0..3 since len < 5.
        assert_eq!(out[0].ma5, (30 + 20 + 10) as f64 / 3.0);
        // index 2 is the oldest bar; only itself remains in the forward window.
        assert_eq!(out[2].ma5, 10.0);
    }
}
