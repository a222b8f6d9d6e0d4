//! Wire-level envelope and DTO types for the brokerage REST surface
//! (spec §4.2, §4.3, §6).
//!
//! The brokerage wraps every response in one of a handful of envelope
//! shapes: `{ rt_cd, msg1, output }`, the two-array `output1`/`output2`
//! variant used by the account-balance endpoint, and the bespoke shapes
//! used by the paged chart/financial-statement endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{ rt_cd, msg1, output }` — the common case (spot quote, daily price
/// series rows, order entry).
#[derive(Debug, Clone, Deserialize)]
pub struct Body {
    pub rt_cd: String,
    pub msg1: String,
    #[serde(default)]
    pub output: Value,
}

impl Body {
    pub fn is_success(&self) -> bool {
        self.rt_cd == "0"
    }
}

/// `{ rt_cd, msg1, output1, output2 }` — account balance (positions +
/// totals).
#[derive(Debug, Clone, Deserialize)]
pub struct TwoArrayData {
    pub rt_cd: String,
    pub msg1: String,
    #[serde(default)]
    pub output1: Vec<Value>,
    #[serde(default)]
    pub output2: Vec<Value>,
}

impl TwoArrayData {
    pub fn is_success(&self) -> bool {
        self.rt_cd == "0"
    }
}

/// `{ rt_cd, msg1, output1, output2 }` where `output2` is the paged array
/// of daily bars and `output1` carries ticker-level metadata. Used by the
/// daily chart price / daily price series endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexData {
    pub rt_cd: String,
    pub msg1: String,
    #[serde(default)]
    pub output1: Value,
    #[serde(default)]
    pub output2: Vec<Value>,
}

impl IndexData {
    pub fn is_success(&self) -> bool {
        self.rt_cd == "0"
    }
}

/// `{ rt_cd, msg1, output }` where `output` is a single financial-statement
/// sheet array (balance/income/ratio/profit/other).
#[derive(Debug, Clone, Deserialize)]
pub struct SheetData {
    pub rt_cd: String,
    pub msg1: String,
    #[serde(default)]
    pub output: Vec<Value>,
}

impl SheetData {
    pub fn is_success(&self) -> bool {
        self.rt_cd == "0"
    }
}

/// OAuth2 client-credentials token response (spec §6 auth endpoint).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub grant_type: &'a str,
    pub appkey: &'a str,
    pub appsecret: &'a str,
}

/// Side of an order (spec §9: stringly-typed `"B"/"S"` represented as a
/// tagged enum at the boundary; wire value preserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn wire(self) -> &'static str {
        match self {
            OrderSide::Buy => "B",
            OrderSide::Sell => "S",
        }
    }
}

/// Financial-statement kind (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Balance,
    Income,
    Ratio,
    Profit,
    Other,
}

impl SheetKind {
    pub fn wire(self) -> &'static str {
        match self {
            SheetKind::Balance => "B",
            SheetKind::Income => "I",
            SheetKind::Ratio => "F",
            SheetKind::Profit => "P",
            SheetKind::Other => "E",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "B" => Some(SheetKind::Balance),
            "I" => Some(SheetKind::Income),
            "F" => Some(SheetKind::Ratio),
            "P" => Some(SheetKind::Profit),
            "E" => Some(SheetKind::Other),
            _ => None,
        }
    }

    /// tr_id suffix per spec §6: FHKST66430{100..500}.
    fn tr_suffix(self) -> &'static str {
        match self {
            SheetKind::Balance => "100",
            SheetKind::Income => "200",
            SheetKind::Ratio => "300",
            SheetKind::Profit => "400",
            SheetKind::Other => "500",
        }
    }

    pub fn tr_id(self) -> String {
        format!("FHKST66430{}", self.tr_suffix())
    }
}

/// Annual vs quarterly sheet cycle (spec §3: sheetClass `"0"`/`"1"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetClass {
    Annual,
    Quarter,
}

impl SheetClass {
    pub fn wire(self) -> &'static str {
        match self {
            SheetClass::Annual => "0",
            SheetClass::Quarter => "1",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "0" => Some(SheetClass::Annual),
            "1" => Some(SheetClass::Quarter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_kind_tr_ids() {
        assert_eq!(SheetKind::Balance.tr_id(), "FHKST66430100");
        assert_eq!(SheetKind::Other.tr_id(), "FHKST66430500");
    }

    #[test]
    fn sheet_kind_round_trips() {
        for k in [
            SheetKind::Balance,
            SheetKind::Income,
            SheetKind::Ratio,
            SheetKind::Profit,
            SheetKind::Other,
        ] {
            assert_eq!(SheetKind::from_wire(k.wire()), Some(k));
        }
        assert_eq!(SheetKind::from_wire("X"), None);
    }
}
