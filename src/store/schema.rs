//! SQLite schema for the snapshot store (C6), following
//! `signals/db_storage.rs::SCHEMA_SQL`: WAL mode, explicit pragmas, and one
//! `execute_batch` applied once at startup.

pub const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tickers (
    code TEXT PRIMARY KEY,
    market TEXT NOT NULL,
    short_name TEXT NOT NULL,
    corporate_name TEXT NOT NULL,
    sector TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS equity_snapshots (
    code TEXT PRIMARY KEY REFERENCES tickers(code),
    industry TEXT NOT NULL,
    status_code TEXT NOT NULL,
    reference_price INTEGER NOT NULL,
    weighted_price INTEGER NOT NULL,
    face_price INTEGER NOT NULL,
    ceiling_price INTEGER NOT NULL,
    floor_price INTEGER NOT NULL,
    listed_shares INTEGER NOT NULL,
    market_cap TEXT NOT NULL,
    turnover_rate REAL NOT NULL,
    foreign_hold_qty INTEGER NOT NULL,
    foreign_net_buy_qty INTEGER NOT NULL,
    program_net_buy_qty INTEGER NOT NULL,
    year_high INTEGER NOT NULL,
    year_high_date TEXT NOT NULL,
    year_low INTEGER NOT NULL,
    year_low_date TEXT NOT NULL,
    rate_vs_year_high REAL NOT NULL,
    rate_vs_year_low REAL NOT NULL,
    per REAL NOT NULL,
    eps REAL NOT NULL,
    pbr REAL NOT NULL,
    bps REAL NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS price_bars (
    code TEXT NOT NULL,
    session_date TEXT NOT NULL,
    open INTEGER NOT NULL,
    high INTEGER NOT NULL,
    low INTEGER NOT NULL,
    close INTEGER NOT NULL,
    volume INTEGER NOT NULL,
    turnover TEXT NOT NULL,
    prior_diff INTEGER NOT NULL,
    prior_sign TEXT NOT NULL,
    ma5 REAL NOT NULL DEFAULT 0,
    ma10 REAL NOT NULL DEFAULT 0,
    ma20 REAL NOT NULL DEFAULT 0,
    ma30 REAL NOT NULL DEFAULT 0,
    ma60 REAL NOT NULL DEFAULT 0,
    ma120 REAL NOT NULL DEFAULT 0,
    ma200 REAL NOT NULL DEFAULT 0,
    ma240 REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (code, session_date)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_price_bars_code_date
    ON price_bars(code, session_date DESC);

CREATE TABLE IF NOT EXISTS sheet_rows (
    code TEXT NOT NULL,
    sheet_kind TEXT NOT NULL,
    sheet_class TEXT NOT NULL,
    year_month TEXT NOT NULL,
    values_json TEXT NOT NULL,
    PRIMARY KEY (code, sheet_kind, sheet_class, year_month)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_sheet_rows_latest
    ON sheet_rows(code, sheet_kind, sheet_class, year_month DESC);

CREATE TABLE IF NOT EXISTS score_cards (
    code TEXT NOT NULL,
    session_date TEXT NOT NULL,
    sheet_score INTEGER NOT NULL,
    trend_score INTEGER NOT NULL,
    price_score INTEGER NOT NULL,
    kpi_score INTEGER NOT NULL,
    buy_score INTEGER NOT NULL,
    cap_score INTEGER NOT NULL,
    per_score INTEGER NOT NULL,
    pbr_score INTEGER NOT NULL,
    total INTEGER NOT NULL,
    PRIMARY KEY (code, session_date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trade_info (
    code TEXT NOT NULL,
    session_date TEXT NOT NULL,
    pivot_p INTEGER NOT NULL,
    r1 INTEGER NOT NULL,
    r2 INTEGER NOT NULL,
    r3 INTEGER NOT NULL,
    s1 INTEGER NOT NULL,
    s2 INTEGER NOT NULL,
    s3 INTEGER NOT NULL,
    today_open INTEGER NOT NULL,
    prior_close INTEGER NOT NULL,
    current_price INTEGER NOT NULL,
    strategy TEXT NOT NULL DEFAULT '',
    candidate TEXT NOT NULL DEFAULT 'N',
    note TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (code, session_date)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_trade_info_candidates
    ON trade_info(session_date, strategy, candidate);

CREATE TABLE IF NOT EXISTS trade_status (
    code TEXT NOT NULL,
    session_date TEXT NOT NULL,
    direction TEXT NOT NULL,
    odno TEXT NOT NULL DEFAULT '',
    qty INTEGER NOT NULL,
    avg_price INTEGER NOT NULL,
    trade_time TEXT NOT NULL,
    PRIMARY KEY (code, session_date)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_trade_status_direction
    ON trade_status(session_date, direction);

CREATE TABLE IF NOT EXISTS trade_history (
    code TEXT NOT NULL,
    session_date TEXT NOT NULL,
    trade_time TEXT NOT NULL,
    entry_type TEXT NOT NULL,
    qty INTEGER NOT NULL,
    price INTEGER NOT NULL,
    note TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (code, session_date, trade_time, entry_type)
) WITHOUT ROWID;
"#;
