//! Entity types for the data model of spec §3, plus their composite keys.
//!
//! Keys are plain value types (never object identity) so they can be used
//! as map keys directly, per spec §9.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeDateKey {
    pub code: String,
    pub session_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SheetKey {
    pub code: String,
    pub sheet_class: String, // "0" annual, "1" quarter
    pub year_month: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub code: String,
    pub market: String,
    pub short_name: String,
    pub corporate_name: String,
    pub sector: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub code: String,
    pub industry: String,
    pub status_code: String,
    pub reference_price: i64,
    pub weighted_price: i64,
    pub face_price: i64,
    pub ceiling_price: i64,
    pub floor_price: i64,
    pub listed_shares: i64,
    pub market_cap: Decimal,
    pub turnover_rate: f64,
    pub foreign_hold_qty: i64,
    pub foreign_net_buy_qty: i64,
    pub program_net_buy_qty: i64,
    pub year_high: i64,
    pub year_high_date: String,
    pub year_low: i64,
    pub year_low_date: String,
    pub rate_vs_year_high: f64,
    pub rate_vs_year_low: f64,
    pub per: f64,
    pub eps: f64,
    pub pbr: f64,
    pub bps: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceBar {
    pub code: String,
    pub session_date: String,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: i64,
    pub turnover: Decimal,
    pub prior_diff: i64,
    pub prior_sign: String,
    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,
    pub ma30: f64,
    pub ma60: f64,
    pub ma120: f64,
    pub ma200: f64,
    pub ma240: f64,
}

/// Common shape of the five financial-statement sheet kinds (spec §3).
/// Stored per `(code, sheetClass, yearMonth)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetRow {
    pub code: String,
    pub sheet_class: String,
    pub year_month: String,
    pub values: std::collections::BTreeMap<String, Decimal>,
}

impl SheetRow {
    pub fn get(&self, field: &str) -> f64 {
        self.values
            .get(field)
            .and_then(|d| d.to_string().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    pub fn key(&self) -> SheetKey {
        SheetKey {
            code: self.code.clone(),
            sheet_class: self.sheet_class.clone(),
            year_month: self.year_month.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreCard {
    pub code: String,
    pub session_date: String,
    pub sheet_score: i64,
    pub trend_score: i64,
    pub price_score: i64,
    pub kpi_score: i64,
    pub buy_score: i64,
    pub cap_score: i64,
    pub per_score: i64,
    pub pbr_score: i64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Candidate {
    Yes,
    No,
}

impl Candidate {
    pub fn wire(&self) -> &'static str {
        match self {
            Candidate::Yes => "Y",
            Candidate::No => "N",
        }
    }

    pub fn from_wire(s: &str) -> Self {
        if s == "Y" {
            Candidate::Yes
        } else {
            Candidate::No
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeInfo {
    pub code: String,
    pub session_date: String,
    pub pivot_p: i64,
    pub r1: i64,
    pub r2: i64,
    pub r3: i64,
    pub s1: i64,
    pub s2: i64,
    pub s3: i64,
    pub today_open: i64,
    pub prior_close: i64,
    pub current_price: i64,
    pub strategy: String,
    pub candidate: String, // "Y" | "N"
    pub note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    BoughtHeld,
    Sold,
}

impl TradeDirection {
    pub fn wire(self) -> &'static str {
        match self {
            TradeDirection::BoughtHeld => "BS",
            TradeDirection::Sold => "SS",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "BS" => Some(TradeDirection::BoughtHeld),
            "SS" => Some(TradeDirection::Sold),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeStatus {
    pub code: String,
    pub session_date: String,
    pub direction: String, // "BS" | "SS"
    pub odno: String,
    pub qty: i64,
    pub avg_price: i64,
    pub trade_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeHistoryType {
    BuySubmitted,
    SellFilled,
}

impl TradeHistoryType {
    pub fn wire(self) -> &'static str {
        match self {
            TradeHistoryType::BuySubmitted => "B",
            TradeHistoryType::SellFilled => "SS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeHistory {
    pub code: String,
    pub session_date: String,
    pub trade_time: String,
    pub entry_type: String, // "B" | "SS"
    pub qty: i64,
    pub price: i64,
    pub note: String,
}

/// The one joined "scoring view" row C6 projects for the scoring engine
/// (spec §4.4) — 29 columns drawn from `Ticker` + `EquitySnapshot` +
/// latest annual `RatioRow` + most recent `PriceBar`.
#[derive(Debug, Clone, Default)]
pub struct ScoringViewRow {
    pub code: String,
    pub market: String,
    pub industry: String,
    pub corporate_name: String,

    pub revenue_growth_rate: f64,
    pub operating_profit_rate: f64,
    pub reserve_rate: f64,
    pub debt_rate: f64,

    pub rate_vs_year_high: f64,
    pub rate_vs_year_low: f64,

    pub close: i64,
    pub ma5: f64,
    pub ma20: f64,
    pub ma60: f64,

    pub listed_shares: i64,

    pub foreign_net_buy_qty: i64,
    pub program_net_buy_qty: i64,
    pub volume: i64,
    pub foreign_hold_qty: i64,

    pub per: f64,
    pub pbr: f64,

    pub year_month: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_wire_round_trips() {
        assert_eq!(Candidate::from_wire("Y"), Candidate::Yes);
        assert_eq!(Candidate::from_wire("N"), Candidate::No);
        assert_eq!(Candidate::from_wire("anything-else"), Candidate::No);
    }

    #[test]
    fn trade_direction_round_trips() {
        assert_eq!(TradeDirection::from_wire("BS"), Some(TradeDirection::BoughtHeld));
        assert_eq!(TradeDirection::from_wire("SS"), Some(TradeDirection::Sold));
        assert_eq!(TradeDirection::from_wire("??"), None);
    }

    #[test]
    fn code_date_key_usable_as_map_key() {
        let mut map = std::collections::HashMap::new();
        map.insert(
            CodeDateKey {
                code: "005930".to_string(),
                session_date: "20260101".to_string(),
            },
            1,
        );
        assert_eq!(
            map.get(&CodeDateKey {
                code: "005930".to_string(),
                session_date: "20260101".to_string(),
            }),
            Some(&1)
        );
    }
}
