//! Intraday trading loop: the buy task (C10) and sell task (C11).

use crate::broker::adapter::{BrokerAdapter, SpotQuote};
use crate::error::CoreError;

pub mod buy;
pub mod sell;

/// Mean of the `Some` pivot levels passed in, ignoring anything that's
/// absent (spec §4.8 buy target, §4.9 stop). `None` when every input is
/// absent.
pub fn mean_of_present(values: &[Option<i64>]) -> Option<i64> {
    let present: Vec<i64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<i64>() / present.len() as i64)
    }
}

/// `stck_oprc` comes back `0` before the opening cross prints (spec §4.3);
/// callers fall back to the most recent `DailyPriceSeries` row's
/// open/high/low rather than feed zeros into the pivot/price plumbing.
/// `daily_price_series` returns newest-first, so the fallback is its first
/// row. A lookup failure or an empty series leaves the quote untouched.
pub async fn fill_open_from_daily_series(
    adapter: &BrokerAdapter,
    code: &str,
    quote: &mut SpotQuote,
) -> Result<(), CoreError> {
    if quote.open != 0 {
        return Ok(());
    }
    let bars = adapter.daily_price_series(code).await?;
    if let Some(latest) = bars.first() {
        quote.open = latest.open;
        quote.high = latest.high;
        quote.low = latest.low;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_ignores_absent_values() {
        assert_eq!(mean_of_present(&[Some(9000), Some(8800), None]), Some(8900));
        assert_eq!(mean_of_present(&[None, None]), None);
        assert_eq!(mean_of_present(&[Some(10)]), Some(10));
    }
}
