//! C2 — Numeric coercion.
//!
//! Brokerage JSON fields routinely arrive as strings with commas, currency
//! marks, or are simply absent. Centralize the "strip non-numeric, then
//! parse, default to zero" policy here instead of scattering it through
//! every adapter method (spec §9).

use serde_json::Value;

/// Keep only digits, a leading sign and a single decimal point.
fn strip(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut seen_dot = false;
    for (i, c) in raw.chars().enumerate() {
        match c {
            '0'..='9' => out.push(c),
            '-' if i == 0 => out.push(c),
            '.' if !seen_dot => {
                seen_dot = true;
                out.push(c);
            }
            _ => {}
        }
    }
    out
}

/// Coerce an untyped JSON scalar to `i64`, defaulting to 0 on any failure.
pub fn to_i64(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        Value::String(s) => {
            let cleaned = strip(s);
            cleaned.parse::<f64>().map(|f| f as i64).unwrap_or(0)
        }
        _ => 0,
    }
}

/// Coerce an untyped JSON scalar to `f64`, defaulting to 0.0 on any failure.
pub fn to_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => strip(s).parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Coerce an untyped JSON scalar to a `rust_decimal::Decimal`, defaulting to
/// zero on any failure. Used for the accounting sums (market cap, turnover,
/// financial-statement rows) the spec requires as big decimals.
pub fn to_decimal(v: &Value) -> rust_decimal::Decimal {
    use rust_decimal::Decimal;
    match v {
        Value::Number(n) => n
            .as_f64()
            .and_then(Decimal::from_f64_retain)
            .unwrap_or(Decimal::ZERO),
        Value::String(s) => {
            let cleaned = strip(s);
            cleaned.parse::<Decimal>().unwrap_or(Decimal::ZERO)
        }
        _ => Decimal::ZERO,
    }
}

/// Look up a field in a JSON object map and coerce it; missing key behaves
/// identically to a present-but-unparseable value (defaults to zero).
pub fn field_i64(obj: &Value, key: &str) -> i64 {
    obj.get(key).map(to_i64).unwrap_or(0)
}

pub fn field_f64(obj: &Value, key: &str) -> f64 {
    obj.get(key).map(to_f64).unwrap_or(0.0)
}

pub fn field_decimal(obj: &Value, key: &str) -> rust_decimal::Decimal {
    obj.get(key).map(to_decimal).unwrap_or(rust_decimal::Decimal::ZERO)
}

pub fn field_str(obj: &Value, key: &str) -> String {
    obj.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_commas_and_currency() {
        assert_eq!(to_i64(&json!("1,234")), 1234);
        assert_eq!(to_i64(&json!("₩9,000")), 9000);
        assert_eq!(to_f64(&json!("12.50%")), 12.50);
    }

    #[test]
    fn defaults_to_zero_on_garbage() {
        assert_eq!(to_i64(&json!("n/a")), 0);
        assert_eq!(to_f64(&json!(null)), 0.0);
        assert_eq!(to_i64(&json!("")), 0);
    }

    #[test]
    fn passes_through_numbers() {
        assert_eq!(to_i64(&json!(42)), 42);
        assert_eq!(to_f64(&json!(3.5)), 3.5);
    }

    #[test]
    fn negative_values() {
        assert_eq!(to_i64(&json!("-500")), -500);
        assert_eq!(to_f64(&json!("-12.3")), -12.3);
    }

    #[test]
    fn field_lookup_missing_key_defaults_zero() {
        let obj = json!({"a": "1"});
        assert_eq!(field_i64(&obj, "missing"), 0);
        assert_eq!(field_str(&obj, "missing"), "");
    }
}
