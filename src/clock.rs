//! Canonical `YYYYMMDD` session-date strings and `HHMMSS` wall-clock strings,
//! both pinned to the market timezone (Asia/Seoul), plus the intraday
//! session window the scheduler fires the buy/sell tasks within.

use chrono::{DateTime, Duration, TimeZone};
use chrono_tz::Asia::Seoul;
use chrono_tz::Tz;

pub const MARKET_TZ: Tz = Seoul;

/// Wall-clock "now" in market time. Exists so tests can't silently depend on
/// the host's local timezone.
pub fn now() -> DateTime<Tz> {
    chrono::Utc::now().with_timezone(&MARKET_TZ)
}

/// `YYYYMMDD` for today, in market time.
pub fn today() -> String {
    now().format("%Y%m%d").to_string()
}

/// `YYYYMMDD` for yesterday, in market time.
pub fn yesterday() -> String {
    day_minus(1)
}

/// `YYYYMMDD` for `n` calendar days before today, in market time.
pub fn day_minus(n: i64) -> String {
    (now() - Duration::days(n)).format("%Y%m%d").to_string()
}

/// `HHMMSS` for the current wall-clock time, in market time.
pub fn wall_time() -> String {
    now().format("%H%M%S").to_string()
}

/// True between 09:00:00 and 15:59:59 market time inclusive, the window the
/// buy/sell tasks are scheduled in.
pub fn is_intraday_session(at: DateTime<Tz>) -> bool {
    let seconds = at.format("%H%M%S").to_string().parse::<u32>().unwrap_or(0);
    (90000..=155959).contains(&seconds)
}

/// Parse a `YYYYMMDD` string into a naive market-time date; used by the
/// snapshot store's composite keys and the MA/pivot engines.
pub fn parse_session_date(s: &str) -> Option<DateTime<Tz>> {
    MARKET_TZ
        .datetime_from_str(&format!("{s} 000000"), "%Y%m%d %H%M%S")
        .ok()
}

/// `YYYYMMDD` for `n` calendar days before the given `YYYYMMDD` string.
/// Falls back to today minus `n` if `session_date` doesn't parse.
pub fn day_minus_from(session_date: &str, n: i64) -> String {
    match parse_session_date(session_date) {
        Some(d) => (d - Duration::days(n)).format("%Y%m%d").to_string(),
        None => day_minus(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_is_eight_digits() {
        assert_eq!(today().len(), 8);
    }

    #[test]
    fn wall_time_is_six_digits() {
        assert_eq!(wall_time().len(), 6);
    }

    #[test]
    fn intraday_window_bounds() {
        let d = MARKET_TZ.datetime_from_str("20260101 090000", "%Y%m%d %H%M%S").unwrap();
        assert!(is_intraday_session(d));
        let before = MARKET_TZ.datetime_from_str("20260101 085959", "%Y%m%d %H%M%S").unwrap();
        assert!(!is_intraday_session(before));
        let after = MARKET_TZ.datetime_from_str("20260101 160000", "%Y%m%d %H%M%S").unwrap();
        assert!(!is_intraday_session(after));
    }

    #[test]
    fn day_minus_parses_back() {
        let s = day_minus(3);
        assert!(parse_session_date(&s).is_some());
    }

    #[test]
    fn day_minus_from_steps_back_one_day() {
        assert_eq!(day_minus_from("20260103", 1), "20260102");
        assert_eq!(day_minus_from("20260101", 1), "20251231");
    }
}
