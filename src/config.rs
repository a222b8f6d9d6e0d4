//! Application configuration (spec §6).
//!
//! Flat env-driven `Config`, following `models::Config::from_env()` in the
//! teacher repo: `dotenv().ok()` once, then `env::var(..).unwrap_or_else`
//! defaults and `.parse().unwrap_or(default)` for numerics.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerMode {
    Real,
    Mock,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,

    pub broker_base_url_real: String,
    pub broker_base_url_mock: String,
    pub broker_app_key: String,
    pub broker_app_secret: String,
    pub broker_account_number: String,
    pub broker_account_product: String,
    pub broker_mode: BrokerMode,

    pub exchange_ref_kospi_url: String,
    pub exchange_ref_kosdaq_url: String,
    pub exchange_ref_key: String,

    pub notify_webhook_url: Option<String>,

    pub trading_contract_rate: f64,
    pub trading_limit_price: i64,
    pub trading_limit_cnt: i64,

    pub buy_use_yn: bool,
    pub buy_test_force_buy: bool,

    pub sell_up_rate: f64,
    pub sell_down_rate: f64,
    pub sell_use_loss_cut: bool,
    pub sell_hold_rate: f64,
    pub sell_test_force_sell: bool,

    /// Total sub-score threshold above which a ScoreCard is persisted
    /// (spec §4.6: `total > 30`).
    pub scoring_total_threshold: i64,

    /// Size of the bounded worker pool for bulk per-ticker ingest (spec §5).
    pub ingest_worker_pool: usize,
}

fn yn(raw: &str) -> bool {
    raw.eq_ignore_ascii_case("y")
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mode = env::var("BROKER_MODE").unwrap_or_else(|_| "mock".to_string());
        let broker_mode = if mode.eq_ignore_ascii_case("real") {
            BrokerMode::Real
        } else {
            BrokerMode::Mock
        };

        Ok(Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "./swingtrader.db".to_string()),

            broker_base_url_real: env::var("BROKER_BASE_URL_REAL")
                .unwrap_or_else(|_| "https://openapi.koreainvestment.com:9443".to_string()),
            broker_base_url_mock: env::var("BROKER_BASE_URL_MOCK")
                .unwrap_or_else(|_| "https://openapivts.koreainvestment.com:29443".to_string()),
            broker_app_key: env::var("BROKER_APP_KEY").unwrap_or_default(),
            broker_app_secret: env::var("BROKER_APP_SECRET").unwrap_or_default(),
            broker_account_number: env::var("BROKER_ACCOUNT_NUMBER").unwrap_or_default(),
            broker_account_product: env::var("BROKER_ACCOUNT_PRODUCT")
                .unwrap_or_else(|_| "01".to_string()),
            broker_mode,

            exchange_ref_kospi_url: env::var("EXCHANGE_REF_KOSPI_URL").unwrap_or_default(),
            exchange_ref_kosdaq_url: env::var("EXCHANGE_REF_KOSDAQ_URL").unwrap_or_default(),
            exchange_ref_key: env::var("EXCHANGE_REF_KEY").unwrap_or_default(),

            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok(),

            trading_contract_rate: env::var("TRADING_CONTRACT_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.1),
            trading_limit_price: env::var("TRADING_LIMIT_PRICE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000_000),
            trading_limit_cnt: env::var("TRADING_LIMIT_CNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),

            buy_use_yn: yn(&env::var("TRADING_BUY_USE_YN").unwrap_or_else(|_| "Y".to_string())),
            buy_test_force_buy: yn(
                &env::var("TRADING_BUY_TEST_FORCE_BUY").unwrap_or_else(|_| "N".to_string()),
            ),

            sell_up_rate: env::var("TRADING_SELL_UP_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            sell_down_rate: env::var("TRADING_SELL_DOWN_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(-10.0),
            sell_use_loss_cut: yn(
                &env::var("TRADING_SELL_USE_LOSS_CUT").unwrap_or_else(|_| "Y".to_string()),
            ),
            sell_hold_rate: env::var("TRADING_SELL_HOLD_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.5),
            sell_test_force_sell: yn(
                &env::var("TRADING_SELL_TEST_FORCE_SELL").unwrap_or_else(|_| "N".to_string()),
            ),

            scoring_total_threshold: env::var("SCORING_TOTAL_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),

            ingest_worker_pool: env::var("INGEST_WORKER_POOL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        })
    }

    pub fn broker_base_url(&self) -> &str {
        match self.broker_mode {
            BrokerMode::Real => &self.broker_base_url_real,
            BrokerMode::Mock => &self.broker_base_url_mock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yn_parses_case_insensitive() {
        assert!(yn("y"));
        assert!(yn("Y"));
        assert!(!yn("N"));
        assert!(!yn(""));
    }
}
