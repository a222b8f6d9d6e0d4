//! C5 — Brokerage adapter.
//!
//! Typed wrappers over C4, one method per endpoint of spec §6, each a
//! single `RateLimitedClient::get`/`post` with a fixed `tr_id` and path
//! template. Grounded on `scrapers/polymarket_api.rs`'s per-endpoint
//! method shape (build params, call, decode, log) and `scrapers/dome_rest.rs`'s
//! one-`Client`-per-adapter convention.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::broker::http::RateLimitedClient;
use crate::broker::types::{Body, IndexData, OrderSide, SheetClass, SheetData, SheetKind, TwoArrayData};
use crate::config::Config;
use crate::error::CoreError;
use crate::numeric::{field_decimal, field_f64, field_i64, field_str};

#[derive(Debug, Clone, Default)]
pub struct SpotQuote {
    pub current: i64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
}

/// The broader equity-reference fields spec §3's `EquitySnapshot`
/// carries, parsed from the same `inquire-price` envelope as
/// [`SpotQuote`] (the real endpoint returns both in one response; this
/// is a second call against it during bulk ingest, not a shared one,
/// since ingest and intraday quoting run on different cadences).
#[derive(Debug, Clone, Default)]
pub struct EquitySnapshotFields {
    pub industry: String,
    pub status_code: String,
    pub reference_price: i64,
    pub weighted_price: i64,
    pub face_price: i64,
    pub ceiling_price: i64,
    pub floor_price: i64,
    pub listed_shares: i64,
    pub market_cap: rust_decimal::Decimal,
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

#[derive(Debug, Clone, Default)]
pub struct Bar {
    pub session_date: String,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: i64,
    pub turnover: rust_decimal::Decimal,
    pub diff: i64,
    pub sign: String,
}

#[derive(Debug, Clone, Default)]
pub struct PositionRow {
    pub code: String,
    pub name: String,
    pub purchase_amount: i64,
    pub purchase_avg_price: i64,
    pub hold_qty: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AccountBalance {
    pub positions: Vec<PositionRow>,
    pub deposit_total: i64,
    pub withdrawable_settlement: i64,
}

impl AccountBalance {
    /// `prvs_rcdl_excc_amt` if > 0 else `dnca_tot_amt` (spec §4.3).
    pub fn effective_cash(&self) -> i64 {
        if self.withdrawable_settlement > 0 {
            self.withdrawable_settlement
        } else {
            self.deposit_total
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaceOrderResult {
    pub success: bool,
    pub odno: Option<String>,
    pub msg1: String,
}

pub struct BrokerAdapter {
    client: Arc<RateLimitedClient>,
    account_number: String,
    account_product: String,
    is_mock: bool,
}

impl BrokerAdapter {
    pub fn new(client: Arc<RateLimitedClient>, cfg: &Config) -> Self {
        Self {
            client,
            account_number: cfg.broker_account_number.clone(),
            account_product: cfg.broker_account_product.clone(),
            is_mock: cfg.broker_mode == crate::config::BrokerMode::Mock,
        }
    }

    /// `inquire-price`, tr=FHKST01010100.
    pub async fn spot_quote(&self, code: &str) -> Result<SpotQuote, CoreError> {
        let query = [
            ("fid_cond_mrkt_div_code", "J"),
            ("fid_input_iscd", code),
        ];
        let body: Body = self
            .client
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                &query,
                "FHKST01010100",
            )
            .await?;

        if !body.is_success() {
            return Err(CoreError::BrokerReject {
                rt_cd: body.rt_cd,
                msg1: body.msg1,
            });
        }

        Ok(SpotQuote {
            current: field_i64(&body.output, "stck_prpr"),
            open: field_i64(&body.output, "stck_oprc"),
            high: field_i64(&body.output, "stck_hgpr"),
            low: field_i64(&body.output, "stck_lwpr"),
        })
    }

    /// Same endpoint as [`Self::spot_quote`], projected onto the wider
    /// set of reference fields `EquitySnapshot` carries (spec §3).
    pub async fn equity_snapshot_fields(&self, code: &str) -> Result<EquitySnapshotFields, CoreError> {
        let query = [
            ("fid_cond_mrkt_div_code", "J"),
            ("fid_input_iscd", code),
        ];
        let body: Body = self
            .client
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-price",
                &query,
                "FHKST01010100",
            )
            .await?;

        if !body.is_success() {
            return Err(CoreError::BrokerReject {
                rt_cd: body.rt_cd,
                msg1: body.msg1,
            });
        }

        let o = &body.output;
        Ok(EquitySnapshotFields {
            industry: field_str(o, "bstp_kor_isnm"),
            status_code: field_str(o, "iscd_stat_cls_code"),
            reference_price: field_i64(o, "stck_sdpr"),
            weighted_price: field_i64(o, "wghn_avrg_stck_prc"),
            face_price: field_i64(o, "stck_fcam"),
            ceiling_price: field_i64(o, "stck_mxpr"),
            floor_price: field_i64(o, "stck_llam"),
            listed_shares: field_i64(o, "lstn_stcn"),
            market_cap: field_decimal(o, "hts_avls"),
            turnover_rate: field_f64(o, "vol_tnrt"),
            foreign_hold_qty: field_i64(o, "frgn_hldn_qty"),
            foreign_net_buy_qty: field_i64(o, "frgn_ntby_qty"),
            program_net_buy_qty: field_i64(o, "pgtr_ntby_qty"),
            year_high: field_i64(o, "w52_hgpr"),
            year_high_date: field_str(o, "w52_hgpr_date"),
            year_low: field_i64(o, "w52_lwpr"),
            year_low_date: field_str(o, "w52_lwpr_date"),
            rate_vs_year_high: field_f64(o, "w52_hgpr_vrss_prpr_rate"),
            rate_vs_year_low: field_f64(o, "w52_lwpr_vrss_prpr_rate"),
            per: field_f64(o, "per"),
            eps: field_f64(o, "eps"),
            pbr: field_f64(o, "pbr"),
            bps: field_f64(o, "bps"),
        })
    }

    /// `inquire-daily-itemchartprice`, tr=FHKST03010100. Up to 100 bars.
    pub async fn daily_chart_price(&self, code: &str, from: &str, to: &str) -> Result<Vec<Bar>, CoreError> {
        let query = [
            ("fid_cond_mrkt_div_code", "J"),
            ("fid_input_iscd", code),
            ("fid_input_date_1", from),
            ("fid_input_date_2", to),
            ("fid_period_div_code", "D"),
            ("fid_org_adj_prc", "1"),
        ];
        let body: IndexData = self
            .client
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice",
                &query,
                "FHKST03010100",
            )
            .await?;

        if !body.is_success() {
            return Err(CoreError::BrokerReject {
                rt_cd: body.rt_cd,
                msg1: body.msg1,
            });
        }

        Ok(body.output2.iter().map(row_to_bar).collect())
    }

    /// Composes four (or one) `daily_chart_price` calls. `todayOnly=true`
    /// issues `[today, today]`; otherwise four batches of 100 days each,
    /// covering `[d-99..d-0], [d-199..d-100], [d-299..d-200], [d-399..d-300]`
    /// concurrently (spec §4.3, §5).
    pub async fn history_chart(&self, code: &str, today_only: bool) -> Result<Vec<Bar>, CoreError> {
        let today = crate::clock::today();
        if today_only {
            return self.daily_chart_price(code, &today, &today).await;
        }

        let windows = [
            (crate::clock::day_minus(99), crate::clock::day_minus(0)),
            (crate::clock::day_minus(199), crate::clock::day_minus(100)),
            (crate::clock::day_minus(299), crate::clock::day_minus(200)),
            (crate::clock::day_minus(399), crate::clock::day_minus(300)),
        ];

        let futures = windows
            .iter()
            .map(|(from, to)| self.daily_chart_price(code, from, to));
        let results = futures_util::future::join_all(futures).await;

        let mut bars = Vec::new();
        for (i, r) in results.into_iter().enumerate() {
            match r {
                Ok(mut batch) => bars.append(&mut batch),
                Err(e) => {
                    warn!(code, window = i, error = %e, "history_chart batch failed");
                    return Err(e);
                }
            }
        }
        Ok(bars)
    }

    /// `inquire-daily-price`, tr=FHKST01010400.
    pub async fn daily_price_series(&self, code: &str) -> Result<Vec<Bar>, CoreError> {
        let query = [
            ("fid_cond_mrkt_div_code", "J"),
            ("fid_input_iscd", code),
            ("fid_org_adj_prc", "1"),
            ("fid_period_div_code", "D"),
        ];
        let body: IndexData = self
            .client
            .get(
                "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
                &query,
                "FHKST01010400",
            )
            .await?;

        if !body.is_success() {
            return Err(CoreError::BrokerReject {
                rt_cd: body.rt_cd,
                msg1: body.msg1,
            });
        }

        Ok(body.output2.iter().map(row_to_bar).collect())
    }

    /// `/uapi/domestic-stock/v1/finance/*`, tr=FHKST66430{100..500}.
    pub async fn financial_sheet(
        &self,
        kind: SheetKind,
        code: &str,
        cycle: SheetClass,
    ) -> Result<Vec<serde_json::Value>, CoreError> {
        let path = match kind {
            SheetKind::Balance => "/uapi/domestic-stock/v1/finance/balance-sheet",
            SheetKind::Income => "/uapi/domestic-stock/v1/finance/income-statement",
            SheetKind::Ratio => "/uapi/domestic-stock/v1/finance/financial-ratio",
            SheetKind::Profit => "/uapi/domestic-stock/v1/finance/profit-ratio",
            SheetKind::Other => "/uapi/domestic-stock/v1/finance/other-major-ratios",
        };

        let query = [
            ("fid_cond_mrkt_div_code", "J"),
            ("fid_input_iscd", code),
            ("fid_div_cls_code", cycle.wire()),
        ];
        let body: SheetData = self.client.get(path, &query, &kind.tr_id()).await?;

        if !body.is_success() {
            return Err(CoreError::BrokerReject {
                rt_cd: body.rt_cd,
                msg1: body.msg1,
            });
        }

        Ok(body.output)
    }

    /// `inquire-balance`, tr=VTTC8434R (mock) / TTTC8434R (real).
    pub async fn account_balance(&self) -> Result<AccountBalance, CoreError> {
        let tr_id = if self.is_mock { "VTTC8434R" } else { "TTTC8434R" };
        let query = [
            ("CANO", self.account_number.as_str()),
            ("ACNT_PRDT_CD", self.account_product.as_str()),
            ("AFHR_FLPR_YN", "N"),
            ("OFL_YN", "N"),
            ("INQR_DVSN", "01"),
            ("UNPR_DVSN", "01"),
            ("FUND_STTL_ICLD_YN", "N"),
            ("FNCG_AMT_AUTO_RDPT_YN", "N"),
            ("PRCS_DVSN", "01"),
            ("CTX_AREA_FK100", ""),
            ("CTX_AREA_NK100", ""),
        ];
        let body: TwoArrayData = self
            .client
            .get("/uapi/domestic-stock/v1/trading/inquire-balance", &query, tr_id)
            .await?;

        if !body.is_success() {
            return Err(CoreError::BrokerReject {
                rt_cd: body.rt_cd,
                msg1: body.msg1,
            });
        }

        let positions = body
            .output1
            .iter()
            .map(|row| PositionRow {
                code: field_str(row, "pdno"),
                name: field_str(row, "prdt_name"),
                purchase_amount: field_i64(row, "pchs_amt"),
                purchase_avg_price: field_i64(row, "pchs_avg_pric"),
                hold_qty: field_i64(row, "hldg_qty"),
            })
            .collect();

        let totals = body.output2.first();
        Ok(AccountBalance {
            positions,
            deposit_total: totals.map(|t| field_i64(t, "dnca_tot_amt")).unwrap_or(0),
            withdrawable_settlement: totals
                .map(|t| field_i64(t, "prvs_rcdl_excc_amt"))
                .unwrap_or(0),
        })
    }

    /// `order-cash`, tr=VTTC0012U/VTTC0011U (mock) or TTTC0012U/TTTC0011U
    /// (real) for buy/sell. `orderKind = "00"` is limit, the only value
    /// used.
    pub async fn place_order(
        &self,
        side: OrderSide,
        code: &str,
        qty: i64,
        price: i64,
    ) -> Result<PlaceOrderResult, CoreError> {
        let tr_id = match (self.is_mock, side) {
            (true, OrderSide::Buy) => "VTTC0012U",
            (true, OrderSide::Sell) => "VTTC0011U",
            (false, OrderSide::Buy) => "TTTC0012U",
            (false, OrderSide::Sell) => "TTTC0011U",
        };

        let payload = json!({
            "CANO": self.account_number,
            "ACNT_PRDT_CD": "01",
            "PDNO": code,
            "ORD_DVSN": "00",
            "ORD_QTY": qty.to_string(),
            "ORD_UNPR": price.to_string(),
        });

        let body: Body = self
            .client
            .post("/uapi/domestic-stock/v1/trading/order-cash", tr_id, &payload)
            .await?;

        Ok(PlaceOrderResult {
            success: body.is_success(),
            odno: body.output.get("ODNO").and_then(|v| v.as_str()).map(|s| s.to_string()),
            msg1: body.msg1,
        })
    }
}

fn row_to_bar(row: &serde_json::Value) -> Bar {
    Bar {
        session_date: field_str(row, "stck_bsop_date"),
        open: field_i64(row, "stck_oprc"),
        high: field_i64(row, "stck_hgpr"),
        low: field_i64(row, "stck_lwpr"),
        close: field_i64(row, "stck_clpr"),
        volume: field_i64(row, "acml_vol"),
        turnover: field_decimal(row, "acml_tr_pbmn"),
        diff: field_i64(row, "prdy_vrss"),
        sign: field_str(row, "prdy_vrss_sign"),
    }
}

/// `kind ∈ {"B","I","F","P","E"}`; invalid `kind` fails with
/// `ArgumentInvalid` (spec §4.3).
pub fn parse_sheet_kind(raw: &str) -> Result<SheetKind, CoreError> {
    SheetKind::from_wire(raw).ok_or_else(|| CoreError::ArgumentInvalid(format!("unknown sheet kind {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn effective_cash_prefers_settlement_when_positive() {
        let bal = AccountBalance {
            positions: vec![],
            deposit_total: 1000,
            withdrawable_settlement: 5000,
        };
        assert_eq!(bal.effective_cash(), 5000);
    }

    #[test]
    fn effective_cash_falls_back_to_deposit_total() {
        let bal = AccountBalance {
            positions: vec![],
            deposit_total: 1000,
            withdrawable_settlement: 0,
        };
        assert_eq!(bal.effective_cash(), 1000);
    }

    #[test]
    fn row_to_bar_coerces_strings() {
        let row = json!({
            "stck_bsop_date": "20260101",
            "stck_oprc": "10,000",
            "stck_hgpr": "10,500",
            "stck_lwpr": "9,800",
            "stck_clpr": "10,200",
            "acml_vol": "1,234,567",
            "acml_tr_pbmn": "12,345,678,900",
            "prdy_vrss": "-100",
            "prdy_vrss_sign": "5",
        });
        let bar = row_to_bar(&row);
        assert_eq!(bar.open, 10_000);
        assert_eq!(bar.volume, 1_234_567);
        assert_eq!(bar.diff, -100);
    }

    #[test]
    fn invalid_sheet_kind_rejected() {
        assert!(matches!(
            parse_sheet_kind("Z"),
            Err(CoreError::ArgumentInvalid(_))
        ));
        assert!(parse_sheet_kind("B").is_ok());
    }
}
