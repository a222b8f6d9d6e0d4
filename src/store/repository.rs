//! C6 — Snapshot store.
//!
//! Upsert-style repository over the entities of spec §3, plus the one
//! JOIN query the scoring engine needs (spec §4.4). Grounded on
//! `signals/db_storage.rs::DbSignalStorage`: `Arc<parking_lot::Mutex<Connection>>`,
//! WAL pragmas + schema applied once via `execute_batch` in `new()`, and
//! `tokio::task::spawn_blocking` around the handful of calls that do
//! nontrivial work on the rusqlite connection from an async context.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use rust_decimal::Decimal;
use tracing::info;

use crate::broker::types::{SheetClass, SheetKind};
use crate::store::entities::{
    Candidate, CodeDateKey, EquitySnapshot, PriceBar, ScoreCard, ScoringViewRow, SheetKey,
    SheetRow, Ticker, TradeHistory, TradeInfo, TradeStatus,
};
use crate::store::schema::SCHEMA_SQL;

#[derive(Clone)]
pub struct SnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SnapshotStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open database at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize snapshot store schema")?;

        info!(db_path, "snapshot store initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .context("snapshot store task panicked")?
    }

    // ---- Ticker -----------------------------------------------------

    pub async fn upsert_ticker(&self, t: Ticker) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tickers (code, market, short_name, corporate_name, sector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(code) DO UPDATE SET
                    market = excluded.market,
                    short_name = excluded.short_name,
                    corporate_name = excluded.corporate_name,
                    sector = excluded.sector",
                params![t.code, t.market, t.short_name, t.corporate_name, t.sector, t.created_at],
            )?;
            Ok(())
        })
        .await
    }

    // ---- EquitySnapshot ----------------------------------------------

    pub async fn upsert_equity_snapshot(&self, s: EquitySnapshot) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO equity_snapshots (
                    code, industry, status_code, reference_price, weighted_price, face_price,
                    ceiling_price, floor_price, listed_shares, market_cap, turnover_rate,
                    foreign_hold_qty, foreign_net_buy_qty, program_net_buy_qty,
                    year_high, year_high_date, year_low, year_low_date,
                    rate_vs_year_high, rate_vs_year_low, per, eps, pbr, bps
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24)
                 ON CONFLICT(code) DO UPDATE SET
                    industry=excluded.industry, status_code=excluded.status_code,
                    reference_price=excluded.reference_price, weighted_price=excluded.weighted_price,
                    face_price=excluded.face_price, ceiling_price=excluded.ceiling_price,
                    floor_price=excluded.floor_price, listed_shares=excluded.listed_shares,
                    market_cap=excluded.market_cap, turnover_rate=excluded.turnover_rate,
                    foreign_hold_qty=excluded.foreign_hold_qty,
                    foreign_net_buy_qty=excluded.foreign_net_buy_qty,
                    program_net_buy_qty=excluded.program_net_buy_qty,
                    year_high=excluded.year_high, year_high_date=excluded.year_high_date,
                    year_low=excluded.year_low, year_low_date=excluded.year_low_date,
                    rate_vs_year_high=excluded.rate_vs_year_high, rate_vs_year_low=excluded.rate_vs_year_low,
                    per=excluded.per, eps=excluded.eps, pbr=excluded.pbr, bps=excluded.bps",
                params![
                    s.code, s.industry, s.status_code, s.reference_price, s.weighted_price,
                    s.face_price, s.ceiling_price, s.floor_price, s.listed_shares,
                    s.market_cap.to_string(), s.turnover_rate, s.foreign_hold_qty,
                    s.foreign_net_buy_qty, s.program_net_buy_qty, s.year_high, s.year_high_date,
                    s.year_low, s.year_low_date, s.rate_vs_year_high, s.rate_vs_year_low,
                    s.per, s.eps, s.pbr, s.bps,
                ],
            )?;
            Ok(())
        })
        .await
    }

    // ---- PriceBar ------------------------------------------------------

    pub async fn upsert_price_bar(&self, b: PriceBar) -> Result<()> {
        self.with_conn(move |conn| {
            upsert_price_bar_sync(conn, &b)?;
            Ok(())
        })
        .await
    }

    /// Newest-first sequence of bars for one ticker (spec §3 read
    /// convention; MA/RSI/OBV index forward from here).
    pub async fn price_bars_newest_first(&self, code: &str) -> Result<Vec<PriceBar>> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT code, session_date, open, high, low, close, volume, turnover,
                        prior_diff, prior_sign, ma5, ma10, ma20, ma30, ma60, ma120, ma200, ma240
                 FROM price_bars WHERE code = ?1 ORDER BY session_date DESC",
            )?;
            let rows = stmt
                .query_map(params![code], row_to_price_bar)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Most recent bar with `sessionDate <= before_date` (spec §4.4:
    /// `maximum sessionDate ≤ today-1`). Tiebreak is moot since
    /// `(code, session_date)` is the primary key.
    pub async fn latest_price_bar_before(&self, code: &str, before_date: &str) -> Result<Option<PriceBar>> {
        let code = code.to_string();
        let before_date = before_date.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT code, session_date, open, high, low, close, volume, turnover,
                        prior_diff, prior_sign, ma5, ma10, ma20, ma30, ma60, ma120, ma200, ma240
                 FROM price_bars WHERE code = ?1 AND session_date <= ?2
                 ORDER BY session_date DESC LIMIT 1",
                params![code, before_date],
                row_to_price_bar,
            )
            .map(Some)
            .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e.into()) })
        })
        .await
    }

    // ---- Financial-statement sheet rows --------------------------------

    pub async fn upsert_sheet_row(&self, kind: SheetKind, row: SheetRow) -> Result<()> {
        self.with_conn(move |conn| {
            let json = serde_json::to_string(&row.values)?;
            conn.execute(
                "INSERT INTO sheet_rows (code, sheet_kind, sheet_class, year_month, values_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(code, sheet_kind, sheet_class, year_month)
                 DO UPDATE SET values_json = excluded.values_json",
                params![row.code, kind.wire(), row.sheet_class, row.year_month, json],
            )?;
            Ok(())
        })
        .await
    }

    /// Most recent annual `RatioRow` for a ticker (sheetClass="0",
    /// max yearMonth), used by the scoring-view JOIN.
    pub async fn latest_annual_ratio_row(&self, code: &str) -> Result<Option<SheetRow>> {
        self.latest_sheet_row(code, SheetKind::Ratio, Some(SheetClass::Annual)).await
    }

    /// Most recent `IncomeRow` irrespective of class (spec §4.6 sheet
    /// score's `netIncome` sub-check).
    pub async fn latest_income_row(&self, code: &str) -> Result<Option<SheetRow>> {
        self.latest_sheet_row(code, SheetKind::Income, None).await
    }

    async fn latest_sheet_row(&self, code: &str, kind: SheetKind, class: Option<SheetClass>) -> Result<Option<SheetRow>> {
        let code = code.to_string();
        self.with_conn(move |conn| {
            let (sql, row) = if let Some(c) = class {
                (
                    "SELECT code, sheet_class, year_month, values_json FROM sheet_rows
                     WHERE code = ?1 AND sheet_kind = ?2 AND sheet_class = ?3
                     ORDER BY year_month DESC, code ASC LIMIT 1",
                    conn.query_row(
                        "SELECT code, sheet_class, year_month, values_json FROM sheet_rows
                         WHERE code = ?1 AND sheet_kind = ?2 AND sheet_class = ?3
                         ORDER BY year_month DESC, code ASC LIMIT 1",
                        params![code, kind.wire(), c.wire()],
                        row_to_sheet_row,
                    ),
                )
            } else {
                (
                    "SELECT code, sheet_class, year_month, values_json FROM sheet_rows
                     WHERE code = ?1 AND sheet_kind = ?2
                     ORDER BY year_month DESC, sheet_class ASC, code ASC LIMIT 1",
                    conn.query_row(
                        "SELECT code, sheet_class, year_month, values_json FROM sheet_rows
                         WHERE code = ?1 AND sheet_kind = ?2
                         ORDER BY year_month DESC, sheet_class ASC, code ASC LIMIT 1",
                        params![code, kind.wire()],
                        row_to_sheet_row,
                    ),
                )
            };
            let _ = sql;
            match row {
                Ok(r) => Ok(Some(r)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    // ---- ScoreCard ------------------------------------------------------

    pub async fn upsert_score_card(&self, c: ScoreCard) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO score_cards (code, session_date, sheet_score, trend_score, price_score,
                    kpi_score, buy_score, cap_score, per_score, pbr_score, total)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
                 ON CONFLICT(code, session_date) DO UPDATE SET
                    sheet_score=excluded.sheet_score, trend_score=excluded.trend_score,
                    price_score=excluded.price_score, kpi_score=excluded.kpi_score,
                    buy_score=excluded.buy_score, cap_score=excluded.cap_score,
                    per_score=excluded.per_score, pbr_score=excluded.pbr_score, total=excluded.total",
                params![
                    c.code, c.session_date, c.sheet_score, c.trend_score, c.price_score,
                    c.kpi_score, c.buy_score, c.cap_score, c.per_score, c.pbr_score, c.total,
                ],
            )?;
            Ok(())
        })
        .await
    }

    // ---- TradeInfo -------------------------------------------------------

    /// Full upsert (used by the scoring engine when a candidate clears the
    /// total threshold: sets candidate="Y", strategy="SW").
    pub async fn upsert_trade_info(&self, t: TradeInfo) -> Result<()> {
        self.with_conn(move |conn| {
            upsert_trade_info_sync(conn, &t)?;
            Ok(())
        })
        .await
    }

    /// Updates only current/open price and recomputed pivots, preserving
    /// whatever `candidate`/`note` the row already carries (spec §4.7,
    /// used by the buy task's per-tick pivot refresh).
    pub async fn update_trade_info_pivots(
        &self,
        key: CodeDateKey,
        today_open: i64,
        current_price: i64,
        pivots: crate::pivot::PivotLevels,
    ) -> Result<()> {
        self.with_conn(move |conn| {
            let existing = fetch_trade_info_sync(conn, &key)?.unwrap_or_else(|| TradeInfo {
                code: key.code.clone(),
                session_date: key.session_date.clone(),
                candidate: "N".to_string(),
                ..Default::default()
            });
            let updated = TradeInfo {
                pivot_p: pivots.p,
                r1: pivots.r1,
                r2: pivots.r2,
                r3: pivots.r3,
                s1: pivots.s1,
                s2: pivots.s2,
                s3: pivots.s3,
                today_open,
                current_price,
                ..existing
            };
            upsert_trade_info_sync(conn, &updated)?;
            Ok(())
        })
        .await
    }

    /// Updates only current/open price, preserving everything else (spec
    /// §4.8 step "Upsert TradeInfo current/open price"; §4.9 step 2).
    pub async fn update_trade_info_price(&self, key: CodeDateKey, today_open: i64, current_price: i64) -> Result<()> {
        self.with_conn(move |conn| {
            let existing = fetch_trade_info_sync(conn, &key)?.unwrap_or_else(|| TradeInfo {
                code: key.code.clone(),
                session_date: key.session_date.clone(),
                candidate: "N".to_string(),
                ..Default::default()
            });
            let updated = TradeInfo {
                today_open,
                current_price,
                ..existing
            };
            upsert_trade_info_sync(conn, &updated)?;
            Ok(())
        })
        .await
    }

    /// Marks a row as a swing candidate: sets `candidate`, `note`, and
    /// `strategy="SW"` (spec §4.6's "set TradeInfo candidate='Y' with tag
    /// 'SW'"). `swing_candidates` below filters on `strategy = 'SW'`, so
    /// this must stamp it or the buy task never sees the row.
    pub async fn set_trade_info_candidate(&self, key: CodeDateKey, candidate: Candidate, note: String) -> Result<()> {
        self.with_conn(move |conn| {
            let mut existing = fetch_trade_info_sync(conn, &key)?.unwrap_or_else(|| TradeInfo {
                code: key.code.clone(),
                session_date: key.session_date.clone(),
                ..Default::default()
            });
            existing.candidate = candidate.wire().to_string();
            existing.note = note;
            existing.strategy = "SW".to_string();
            upsert_trade_info_sync(conn, &existing)?;
            Ok(())
        })
        .await
    }

    pub async fn get_trade_info(&self, key: CodeDateKey) -> Result<Option<TradeInfo>> {
        self.with_conn(move |conn| fetch_trade_info_sync(conn, &key)).await
    }

    /// All TradeInfo with `sessionDate=today`, strategy="SW",
    /// `candidate != "N"` (spec §4.8 step 4).
    pub async fn swing_candidates(&self, session_date: &str) -> Result<Vec<TradeInfo>> {
        let session_date = session_date.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT code, session_date, pivot_p, r1, r2, r3, s1, s2, s3, today_open,
                        prior_close, current_price, strategy, candidate, note
                 FROM trade_info
                 WHERE session_date = ?1 AND strategy = 'SW' AND candidate != 'N'
                 ORDER BY code ASC",
            )?;
            let rows = stmt
                .query_map(params![session_date], row_to_trade_info)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    // ---- TradeStatus -----------------------------------------------------

    pub async fn upsert_trade_status(&self, s: TradeStatus) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO trade_status (code, session_date, direction, odno, qty, avg_price, trade_time)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)
                 ON CONFLICT(code, session_date) DO UPDATE SET
                    direction=excluded.direction, odno=excluded.odno, qty=excluded.qty,
                    avg_price=excluded.avg_price, trade_time=excluded.trade_time",
                params![s.code, s.session_date, s.direction, s.odno, s.qty, s.avg_price, s.trade_time],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn trade_status(&self, key: CodeDateKey) -> Result<Option<TradeStatus>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT code, session_date, direction, odno, qty, avg_price, trade_time
                 FROM trade_status WHERE code = ?1 AND session_date = ?2",
                params![key.code, key.session_date],
                row_to_trade_status,
            )
            .map(Some)
            .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e.into()) })
        })
        .await
    }

    /// TradeStatus rows where `sessionDate=today AND direction=BS` (spec
    /// §4.9 step 1).
    pub async fn bought_held_positions(&self, session_date: &str) -> Result<Vec<TradeStatus>> {
        let session_date = session_date.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT code, session_date, direction, odno, qty, avg_price, trade_time
                 FROM trade_status WHERE session_date = ?1 AND direction = 'BS' ORDER BY code ASC",
            )?;
            let rows = stmt
                .query_map(params![session_date], row_to_trade_status)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    // ---- TradeHistory ------------------------------------------------------

    pub async fn append_trade_history(&self, h: TradeHistory) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO trade_history (code, session_date, trade_time, entry_type, qty, price, note)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![h.code, h.session_date, h.trade_time, h.entry_type, h.qty, h.price, h.note],
            )?;
            Ok(())
        })
        .await
    }

    /// Whether a TradeHistory row of type `entry_type` exists for
    /// `(code, session_date)` (spec §4.8 step "one buy per ticker per day").
    pub async fn trade_history_exists(&self, code: &str, session_date: &str, entry_type: &str) -> Result<bool> {
        let code = code.to_string();
        let session_date = session_date.to_string();
        let entry_type = entry_type.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM trade_history WHERE code = ?1 AND session_date = ?2 AND entry_type = ?3",
                params![code, session_date, entry_type],
                |r| r.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    /// All ticker codes belonging to one market, ascending by code — the
    /// input set the nightly bulk-ingest dispatcher fans out over.
    pub async fn codes_for_market(&self, market: &str) -> Result<Vec<String>> {
        let market = market.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT code FROM tickers WHERE market = ?1 ORDER BY code ASC")?;
            let rows = stmt
                .query_map(params![market], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    // ---- The scoring view JOIN (spec §4.4) ---------------------------------

    /// Issued once per scoring run and iterated; no per-ticker reads of the
    /// same tables should occur elsewhere in the scoring pass. Ordered by
    /// `(market, industry, code)` as spec §4.6 requires for determinism.
    /// Excludes tickers whose name contains "스팩" (SPAC).
    pub async fn scoring_view(&self, today: &str) -> Result<Vec<ScoringViewRow>> {
        let today = today.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.code, t.market, es.industry, t.corporate_name,
                        es.rate_vs_year_high, es.rate_vs_year_low,
                        es.listed_shares, es.foreign_net_buy_qty, es.program_net_buy_qty,
                        es.foreign_hold_qty, es.per, es.pbr
                 FROM tickers t
                 JOIN equity_snapshots es ON es.code = t.code
                 WHERE t.corporate_name NOT LIKE '%스팩%'
                 ORDER BY t.market ASC, es.industry ASC, t.code ASC",
            )?;

            let base_rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, f64>(10)?,
                        row.get::<_, f64>(11)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(base_rows.len());
            for (code, market, industry, name, rvh, rvl, shares, fnb, pnb, fhq, per, pbr) in base_rows {
                let bar = conn
                    .query_row(
                        "SELECT close, volume, ma5, ma20, ma60 FROM price_bars
                         WHERE code = ?1 AND session_date < ?2 ORDER BY session_date DESC LIMIT 1",
                        params![code, today],
                        |r| {
                            Ok((
                                r.get::<_, i64>(0)?,
                                r.get::<_, i64>(1)?,
                                r.get::<_, f64>(2)?,
                                r.get::<_, f64>(3)?,
                                r.get::<_, f64>(4)?,
                            ))
                        },
                    )
                    .ok();
                let Some((close, volume, ma5, ma20, ma60)) = bar else {
                    continue;
                };

                let ratio = conn
                    .query_row(
                        "SELECT year_month, values_json FROM sheet_rows
                         WHERE code = ?1 AND sheet_kind = ?2 AND sheet_class = ?3
                         ORDER BY year_month DESC, code ASC LIMIT 1",
                        params![code, SheetKind::Ratio.wire(), SheetClass::Annual.wire()],
                        |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                    )
                    .ok();
                let (year_month, values) = match ratio {
                    Some((ym, json)) => (
                        ym,
                        serde_json::from_str::<BTreeMap<String, Decimal>>(&json).unwrap_or_default(),
                    ),
                    None => (String::new(), BTreeMap::new()),
                };
                let val = |k: &str| values.get(k).and_then(|d| d.to_string().parse::<f64>().ok()).unwrap_or(0.0);

                out.push(ScoringViewRow {
                    code,
                    market,
                    industry,
                    corporate_name: name,
                    revenue_growth_rate: val("revenue_growth_rate"),
                    operating_profit_rate: val("operating_profit_rate"),
                    reserve_rate: val("reserve_rate"),
                    debt_rate: val("debt_rate"),
                    rate_vs_year_high: rvh,
                    rate_vs_year_low: rvl,
                    close,
                    ma5,
                    ma20,
                    ma60,
                    listed_shares: shares,
                    foreign_net_buy_qty: fnb,
                    program_net_buy_qty: pnb,
                    volume,
                    foreign_hold_qty: fhq,
                    per,
                    pbr,
                    year_month,
                });
            }
            Ok(out)
        })
        .await
    }
}

fn upsert_price_bar_sync(conn: &Connection, b: &PriceBar) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO price_bars (code, session_date, open, high, low, close, volume, turnover,
            prior_diff, prior_sign, ma5, ma10, ma20, ma30, ma60, ma120, ma200, ma240)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
         ON CONFLICT(code, session_date) DO UPDATE SET
            open=excluded.open, high=excluded.high, low=excluded.low, close=excluded.close,
            volume=excluded.volume, turnover=excluded.turnover, prior_diff=excluded.prior_diff,
            prior_sign=excluded.prior_sign, ma5=excluded.ma5, ma10=excluded.ma10, ma20=excluded.ma20,
            ma30=excluded.ma30, ma60=excluded.ma60, ma120=excluded.ma120, ma200=excluded.ma200,
            ma240=excluded.ma240",
        params![
            b.code, b.session_date, b.open, b.high, b.low, b.close, b.volume, b.turnover.to_string(),
            b.prior_diff, b.prior_sign, b.ma5, b.ma10, b.ma20, b.ma30, b.ma60, b.ma120, b.ma200, b.ma240,
        ],
    )?;
    Ok(())
}

fn upsert_trade_info_sync(conn: &Connection, t: &TradeInfo) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO trade_info (code, session_date, pivot_p, r1, r2, r3, s1, s2, s3,
            today_open, prior_close, current_price, strategy, candidate, note)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)
         ON CONFLICT(code, session_date) DO UPDATE SET
            pivot_p=excluded.pivot_p, r1=excluded.r1, r2=excluded.r2, r3=excluded.r3,
            s1=excluded.s1, s2=excluded.s2, s3=excluded.s3, today_open=excluded.today_open,
            prior_close=excluded.prior_close, current_price=excluded.current_price,
            strategy=excluded.strategy, candidate=excluded.candidate, note=excluded.note",
        params![
            t.code, t.session_date, t.pivot_p, t.r1, t.r2, t.r3, t.s1, t.s2, t.s3,
            t.today_open, t.prior_close, t.current_price, t.strategy, t.candidate, t.note,
        ],
    )?;
    Ok(())
}

fn fetch_trade_info_sync(conn: &Connection, key: &CodeDateKey) -> Result<Option<TradeInfo>> {
    conn.query_row(
        "SELECT code, session_date, pivot_p, r1, r2, r3, s1, s2, s3, today_open,
                prior_close, current_price, strategy, candidate, note
         FROM trade_info WHERE code = ?1 AND session_date = ?2",
        params![key.code, key.session_date],
        row_to_trade_info,
    )
    .map(Some)
    .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e.into()) })
}

fn row_to_price_bar(row: &rusqlite::Row) -> rusqlite::Result<PriceBar> {
    Ok(PriceBar {
        code: row.get(0)?,
        session_date: row.get(1)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
        turnover: row.get::<_, String>(7)?.parse().unwrap_or_default(),
        prior_diff: row.get(8)?,
        prior_sign: row.get(9)?,
        ma5: row.get(10)?,
        ma10: row.get(11)?,
        ma20: row.get(12)?,
        ma30: row.get(13)?,
        ma60: row.get(14)?,
        ma120: row.get(15)?,
        ma200: row.get(16)?,
        ma240: row.get(17)?,
    })
}

fn row_to_trade_info(row: &rusqlite::Row) -> rusqlite::Result<TradeInfo> {
    Ok(TradeInfo {
        code: row.get(0)?,
        session_date: row.get(1)?,
        pivot_p: row.get(2)?,
        r1: row.get(3)?,
        r2: row.get(4)?,
        r3: row.get(5)?,
        s1: row.get(6)?,
        s2: row.get(7)?,
        s3: row.get(8)?,
        today_open: row.get(9)?,
        prior_close: row.get(10)?,
        current_price: row.get(11)?,
        strategy: row.get(12)?,
        candidate: row.get(13)?,
        note: row.get(14)?,
    })
}

fn row_to_trade_status(row: &rusqlite::Row) -> rusqlite::Result<TradeStatus> {
    Ok(TradeStatus {
        code: row.get(0)?,
        session_date: row.get(1)?,
        direction: row.get(2)?,
        odno: row.get(3)?,
        qty: row.get(4)?,
        avg_price: row.get(5)?,
        trade_time: row.get(6)?,
    })
}

fn row_to_sheet_row(row: &rusqlite::Row) -> rusqlite::Result<SheetRow> {
    let code: String = row.get(0)?;
    let sheet_class: String = row.get(1)?;
    let year_month: String = row.get(2)?;
    let json: String = row.get(3)?;
    let values: BTreeMap<String, Decimal> = serde_json::from_str(&json).unwrap_or_default();
    Ok(SheetRow {
        code,
        sheet_class,
        year_month,
        values,
    })
}

#[allow(dead_code)]
fn sheet_key_from_row(row: &SheetRow) -> SheetKey {
    row.key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::entities::{EquitySnapshot, PriceBar, Ticker};

    fn store() -> SnapshotStore {
        SnapshotStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn upserting_a_ticker_twice_is_idempotent() {
        let s = store();
        let t = Ticker {
            code: "005930".to_string(),
            market: "KOSPI".to_string(),
            short_name: "Samsung".to_string(),
            corporate_name: "Samsung Electronics".to_string(),
            sector: "Tech".to_string(),
            created_at: "2026-01-01".to_string(),
        };
        s.upsert_ticker(t.clone()).await.unwrap();
        s.upsert_ticker(t.clone()).await.unwrap();

        let count: i64 = s
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM tickers", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn price_bars_read_newest_first() {
        let s = store();
        s.upsert_ticker(Ticker {
            code: "005930".to_string(),
            market: "KOSPI".to_string(),
            short_name: "x".to_string(),
            corporate_name: "x".to_string(),
            sector: "x".to_string(),
            created_at: "2026-01-01".to_string(),
        })
        .await
        .unwrap();

        for (date, close) in [("20260101", 100), ("20260102", 110), ("20260103", 120)] {
            s.upsert_price_bar(PriceBar {
                code: "005930".to_string(),
                session_date: date.to_string(),
                close,
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let bars = s.price_bars_newest_first("005930").await.unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].session_date, "20260103");
        assert_eq!(bars[2].session_date, "20260101");
    }

    #[tokio::test]
    async fn trade_info_pivot_update_preserves_candidate_and_note() {
        let s = store();
        let key = CodeDateKey {
            code: "005930".to_string(),
            session_date: "20260101".to_string(),
        };
        s.upsert_trade_info(TradeInfo {
            code: key.code.clone(),
            session_date: key.session_date.clone(),
            candidate: "Y".to_string(),
            note: "swing target".to_string(),
            strategy: "SW".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

        s.update_trade_info_pivots(
            key.clone(),
            1000,
            1050,
            crate::pivot::PivotLevels {
                p: 1000,
                r1: 1100,
                r2: 0,
                r3: 0,
                s1: 900,
                s2: 0,
                s3: 0,
            },
        )
        .await
        .unwrap();

        let updated = s.get_trade_info(key).await.unwrap().unwrap();
        assert_eq!(updated.candidate, "Y");
        assert_eq!(updated.note, "swing target");
        assert_eq!(updated.s1, 900);
        assert_eq!(updated.current_price, 1050);
    }

    #[tokio::test]
    async fn scoring_view_excludes_spac_names() {
        let s = store();
        for (code, name) in [("000001", "Real Co"), ("000002", "Fake 스팩 Co")] {
            s.upsert_ticker(Ticker {
                code: code.to_string(),
                market: "KOSPI".to_string(),
                short_name: name.to_string(),
                corporate_name: name.to_string(),
                sector: "x".to_string(),
                created_at: "2026-01-01".to_string(),
            })
            .await
            .unwrap();
            s.upsert_equity_snapshot(EquitySnapshot {
                code: code.to_string(),
                listed_shares: 1,
                ..Default::default()
            })
            .await
            .unwrap();
            s.upsert_price_bar(PriceBar {
                code: code.to_string(),
                session_date: "20251231".to_string(),
                close: 1000,
                ..Default::default()
            })
            .await
            .unwrap();
        }

        let view = s.scoring_view("20260101").await.unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].code, "000001");
    }

    #[tokio::test]
    async fn trade_history_dedup_check() {
        let s = store();
        assert!(!s.trade_history_exists("005930", "20260101", "B").await.unwrap());
        s.append_trade_history(TradeHistory {
            code: "005930".to_string(),
            session_date: "20260101".to_string(),
            trade_time: "093000".to_string(),
            entry_type: "B".to_string(),
            qty: 10,
            price: 1000,
            note: String::new(),
        })
        .await
        .unwrap();
        assert!(s.trade_history_exists("005930", "20260101", "B").await.unwrap());
    }
}
