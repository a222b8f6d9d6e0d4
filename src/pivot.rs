//! Classical daily pivot levels from the prior day's OHLC and today's
//! open/high/low. All arithmetic is integer, truncating toward zero —
//! the same precision the brokerage itself reports prices in.

use std::sync::Arc;

use anyhow::Result;

use crate::store::entities::CodeDateKey;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PivotLevels {
    pub p: i64,
    pub r1: i64,
    pub r2: i64,
    pub r3: i64,
    pub s1: i64,
    pub s2: i64,
    pub s3: i64,
}

/// `prior` is `(open, high, low, close)` of the prior session; `today_open`
/// is today's open, `today_high`/`today_low` today's running high/low.
pub fn compute_pivots(prior_high: i64, prior_low: i64, prior_close: i64, today_open: i64, today_high: i64, today_low: i64) -> PivotLevels {
    let p = (prior_high + prior_low + prior_close) / 3;
    let r1 = 2 * p - prior_low;
    let s1 = 2 * p - prior_high;

    if today_open > 0 {
        let range = today_high - today_low;
        PivotLevels {
            p,
            r1,
            r2: p + range,
            r3: r1 + range,
            s1,
            s2: p - range,
            s3: s1 - range,
        }
    } else {
        PivotLevels { p, r1, r2: 0, r3: 0, s1, s2: 0, s3: 0 }
    }
}

/// `compute_pivots` encodes "not computed" as `0` for the extended levels
/// when today's open is absent. The buy/sell targets treat that `0` the
/// same way as a `null` pivot: excluded from the mean (spec §4.8/§4.9's
/// "ignoring null values").
pub fn nonzero_level(v: i64) -> Option<i64> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

pub struct PivotEngine {
    store: Arc<SnapshotStore>,
}

impl PivotEngine {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Recomputes today's pivots for a ticker and upserts them into
    /// TradeInfo, preserving whatever `candidate`/`note` already exist.
    pub async fn recompute(
        &self,
        code: &str,
        session_date: &str,
        today_open: i64,
        today_high: i64,
        today_low: i64,
    ) -> Result<PivotLevels> {
        let prior = self.store.latest_price_bar_before(code, &prior_day_bound(session_date)).await?;
        let (ph, pl, pc) = prior.map(|b| (b.high, b.low, b.close)).unwrap_or((0, 0, 0));
        let levels = compute_pivots(ph, pl, pc, today_open, today_high, today_low);

        self.store
            .update_trade_info_pivots(
                CodeDateKey { code: code.to_string(), session_date: session_date.to_string() },
                today_open,
                today_open,
                levels,
            )
            .await?;
        Ok(levels)
    }
}

/// `latest_price_bar_before` takes an inclusive upper bound; passing
/// `session_date` itself would also match today's own bar once ingested,
/// so pivots are always computed against the most recent bar strictly
/// before today by asking for bars on or before yesterday.
fn prior_day_bound(session_date: &str) -> String {
    crate::clock::day_minus_from(session_date, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_arithmetic_with_positive_open_extends_the_range() {
        // prior H=110, L=90, C=100 -> P=(110+90+100)/3=100
        let levels = compute_pivots(110, 90, 100, 105, 112, 98);
        assert_eq!(levels.p, 100);
        assert_eq!(levels.r1, 2 * 100 - 90);
        assert_eq!(levels.s1, 2 * 100 - 110);
        let range = 112 - 98;
        assert_eq!(levels.r2, levels.p + range);
        assert_eq!(levels.r3, levels.r1 + range);
        assert_eq!(levels.s2, levels.p - range);
        assert_eq!(levels.s3, levels.s1 - range);
    }

    #[test]
    fn zero_open_leaves_extended_levels_at_zero() {
        let levels = compute_pivots(110, 90, 100, 0, 112, 98);
        assert_eq!(levels.r2, 0);
        assert_eq!(levels.r3, 0);
        assert_eq!(levels.s2, 0);
        assert_eq!(levels.s3, 0);
        assert_eq!(levels.p, 100);
    }

    #[test]
    fn division_truncates_toward_zero() {
        // H=10, L=10, C=11 -> sum=31, P=31/3=10 (integer truncation)
        let levels = compute_pivots(10, 10, 11, 1, 10, 10);
        assert_eq!(levels.p, 10);
    }
}
