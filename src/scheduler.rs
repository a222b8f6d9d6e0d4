//! C12 — Scheduler.
//!
//! One `tokio::spawn`ed task per cron-style job, each owning its own
//! timer and a `try_lock` on a mutex scoped to that job name, so an
//! overlapping tick is dropped rather than queued (spec §4.10, §9).
//! Grounded on `betterbot-backend::main`'s `tokio::spawn` + `interval`
//! background-task pattern (e.g. `tracked_wallet_polling`,
//! `storage_pruning_polling`), generalized from fixed-interval polling to
//! cron-style "fire once per day/month at HH:MM" triggers.

use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::adapter::BrokerAdapter;
use crate::clock;
use crate::config::Config;
use crate::ma::MovingAverageEngine;
use crate::notify::Notifier;
use crate::position::{PositionService, TickerLocks};
use crate::scoring::ScoringEngine;
use crate::store::entities::{EquitySnapshot, Ticker};
use crate::store::SnapshotStore;
use crate::trading::buy::BuyTask;
use crate::trading::sell::SellTask;
use crate::universe::UniverseClient;

const POLL_INTERVAL: Duration = Duration::from_secs(20);
const BUY_SELL_INTERVAL: Duration = Duration::from_secs(30);

/// Guards one cron job name against overlapping runs; `try_lock` makes a
/// contended tick a no-op instead of a queued one.
struct JobGuard {
    name: &'static str,
    mutex: AsyncMutex<()>,
}

impl JobGuard {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            mutex: AsyncMutex::new(()),
        }
    }

    async fn try_run<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let Ok(_guard) = self.mutex.try_lock() else {
            warn!(job = self.name, "tick dropped: previous run still in flight");
            return;
        };
        info!(job = self.name, "job run starting");
        if let Err(e) = f().await {
            warn!(job = self.name, error = %e, "job run failed");
        } else {
            info!(job = self.name, "job run complete");
        }
    }
}

pub struct Scheduler {
    store: Arc<SnapshotStore>,
    adapter: Arc<BrokerAdapter>,
    notifier: Arc<Notifier>,
    cfg: Arc<Config>,
    universe: Arc<UniverseClient>,
    dry_run: bool,
}

impl Scheduler {
    pub fn new(store: Arc<SnapshotStore>, adapter: Arc<BrokerAdapter>, notifier: Arc<Notifier>, cfg: Arc<Config>, dry_run: bool) -> Self {
        let universe = Arc::new(UniverseClient::new(cfg.exchange_ref_key.clone()));
        Self {
            store,
            adapter,
            notifier,
            cfg,
            universe,
            dry_run,
        }
    }

    /// Runs one pass of bulk ingest (both markets) followed by a scoring
    /// run, then returns — the `--once` CLI surface for cron-external
    /// invocation or manual backfill, skipping the intraday buy/sell loop
    /// since it depends on `is_intraday_session`.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        self.run_bulk_ingest("KOSDAQ").await?;
        self.run_bulk_ingest("KOSPI").await?;
        self.run_scoring().await?;
        Ok(())
    }

    /// Spawns one background task per job. The returned handles are
    /// intended to run for the lifetime of the process.
    pub fn spawn_all(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.clone().spawn_universe_refresh(),
            self.clone().spawn_bulk_ingest("KOSDAQ", 16, 0),
            self.clone().spawn_bulk_ingest("KOSPI", 17, 0),
            self.clone().spawn_scoring_run(),
            self.clone().spawn_buy_sell(),
        ]
    }

    fn spawn_universe_refresh(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let guard = JobGuard::new("universe_refresh");
            let mut last_fired = String::new();
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let now = clock::now();
                let is_first_of_month = now.format("%d").to_string() == "01";
                let matches_time = now.format("%H:%M").to_string() == "06:00";
                let today = clock::today();
                if is_first_of_month && matches_time && last_fired != today {
                    last_fired = today.clone();
                    let this = self.clone();
                    guard.try_run(|| async move { this.run_universe_refresh().await }).await;
                }
            }
        })
    }

    fn spawn_bulk_ingest(self: Arc<Self>, market: &'static str, hour: u32, minute: u32) -> JoinHandle<()> {
        tokio::spawn(async move {
            let guard = JobGuard::new(market);
            let mut last_fired = String::new();
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let now = clock::now();
                let matches_time = now.format("%H:%M").to_string() == format!("{hour:02}:{minute:02}");
                let today = clock::today();
                if matches_time && last_fired != today {
                    last_fired = today.clone();
                    let this = self.clone();
                    guard.try_run(|| async move { this.run_bulk_ingest(market).await }).await;
                }
            }
        })
    }

    fn spawn_scoring_run(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let guard = JobGuard::new("scoring_run");
            let mut last_fired = String::new();
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                ticker.tick().await;
                let now = clock::now();
                let matches_time = now.format("%H:%M").to_string() == "05:00";
                let today = clock::today();
                if matches_time && last_fired != today {
                    last_fired = today.clone();
                    let this = self.clone();
                    guard.try_run(|| async move { this.run_scoring().await }).await;
                }
            }
        })
    }

    fn spawn_buy_sell(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let buy_guard = JobGuard::new("buy_task");
            let sell_guard = JobGuard::new("sell_task");
            let locks = Arc::new(TickerLocks::new());
            let positions = Arc::new(PositionService::new(self.store.clone()));
            let mut ticker = tokio::time::interval(BUY_SELL_INTERVAL);
            loop {
                ticker.tick().await;
                if !clock::is_intraday_session(clock::now()) {
                    continue;
                }

                let buy_task = BuyTask::new(
                    self.store.clone(),
                    self.adapter.clone(),
                    positions.clone(),
                    locks.clone(),
                    self.notifier.clone(),
                    self.cfg.clone(),
                    self.dry_run,
                );
                buy_guard.try_run(|| async move { buy_task.run_once().await }).await;

                let sell_task = SellTask::new(
                    self.store.clone(),
                    self.adapter.clone(),
                    positions.clone(),
                    locks.clone(),
                    self.notifier.clone(),
                    self.cfg.clone(),
                    self.dry_run,
                );
                sell_guard.try_run(|| async move { sell_task.run_once().await }).await;
            }
        })
    }

    async fn run_universe_refresh(&self) -> anyhow::Result<()> {
        self.notifier.notify("universe refresh: starting").await;
        for (market, url) in [
            ("KOSPI", self.cfg.exchange_ref_kospi_url.as_str()),
            ("KOSDAQ", self.cfg.exchange_ref_kosdaq_url.as_str()),
        ] {
            if url.is_empty() {
                continue;
            }
            let rows = self.universe.fetch(url).await?;
            for row in rows {
                self.store
                    .upsert_ticker(Ticker {
                        code: row.code,
                        market: market.to_string(),
                        short_name: row.short_name,
                        corporate_name: row.corporate_name,
                        sector: row.sector,
                        created_at: clock::today(),
                    })
                    .await?;
            }
        }
        self.notifier.notify("universe refresh: complete").await;
        Ok(())
    }

    /// Per-ticker daily ingest: spot snapshot, daily chart history, five
    /// financial sheets x2 cycles, then the MA recompute (spec §4.3,
    /// §4.5, §5's up-to-11-calls-per-ticker fan-out).
    async fn run_bulk_ingest(&self, market: &str) -> anyhow::Result<()> {
        self.notifier.notify(format!("{market} ingest: starting")).await;
        let tickers = self.store_codes_for_market(market).await?;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.cfg.ingest_worker_pool));
        let mut handles = Vec::new();

        for code in tickers {
            let permit = semaphore.clone().acquire_owned().await?;
            let store = self.store.clone();
            let adapter = self.adapter.clone();
            let code2 = code.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = ingest_one_ticker(&store, &adapter, &code2).await {
                    warn!(code = %code2, error = %e, "bulk ingest: ticker failed");
                    return;
                }
                let ma = MovingAverageEngine::new(store.clone());
                if let Err(e) = ma.recompute(&code2).await {
                    warn!(code = %code2, error = %e, "bulk ingest: MA recompute failed");
                }
            }));
        }
        for h in handles {
            let _ = h.await;
        }
        self.notifier.notify(format!("{market} ingest: complete")).await;
        Ok(())
    }

    async fn store_codes_for_market(&self, market: &str) -> anyhow::Result<Vec<String>> {
        self.store.codes_for_market(market).await
    }

    async fn run_scoring(&self) -> anyhow::Result<()> {
        self.notifier.notify("scoring run: starting").await;
        let engine = ScoringEngine::new(self.store.clone(), self.cfg.clone());
        engine.run().await?;
        self.notifier.notify("scoring run: complete").await;
        Ok(())
    }
}

/// Fetches the spot snapshot, daily chart history, and all five
/// financial sheets (both cycles) for one ticker, concurrently, and
/// writes everything back through the store.
async fn ingest_one_ticker(store: &SnapshotStore, adapter: &BrokerAdapter, code: &str) -> anyhow::Result<()> {
    use crate::broker::types::{SheetClass, SheetKind};

    let (fields, bars) = tokio::try_join!(adapter.equity_snapshot_fields(code), adapter.history_chart(code, false))?;

    let snapshot = EquitySnapshot {
        code: code.to_string(),
        industry: fields.industry,
        status_code: fields.status_code,
        reference_price: fields.reference_price,
        weighted_price: fields.weighted_price,
        face_price: fields.face_price,
        ceiling_price: fields.ceiling_price,
        floor_price: fields.floor_price,
        listed_shares: fields.listed_shares,
        market_cap: fields.market_cap,
        turnover_rate: fields.turnover_rate,
        foreign_hold_qty: fields.foreign_hold_qty,
        foreign_net_buy_qty: fields.foreign_net_buy_qty,
        program_net_buy_qty: fields.program_net_buy_qty,
        year_high: fields.year_high,
        year_high_date: fields.year_high_date,
        year_low: fields.year_low,
        year_low_date: fields.year_low_date,
        rate_vs_year_high: fields.rate_vs_year_high,
        rate_vs_year_low: fields.rate_vs_year_low,
        per: fields.per,
        eps: fields.eps,
        pbr: fields.pbr,
        bps: fields.bps,
    };
    store.upsert_equity_snapshot(snapshot).await?;

    for bar in bars {
        store
            .upsert_price_bar(crate::store::entities::PriceBar {
                code: code.to_string(),
                session_date: bar.session_date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                turnover: bar.turnover,
                prior_diff: bar.diff,
                prior_sign: bar.sign,
                ..Default::default()
            })
            .await?;
    }

    let kinds = [
        SheetKind::Balance,
        SheetKind::Income,
        SheetKind::Ratio,
        SheetKind::Profit,
        SheetKind::Other,
    ];
    let cycles = [SheetClass::Annual, SheetClass::Quarter];

    let mut sheet_futures = Vec::new();
    for kind in kinds {
        for cycle in cycles {
            sheet_futures.push(adapter.financial_sheet(kind, code, cycle).map(move |r| (kind, cycle, r)));
        }
    }
    let results = futures_util::future::join_all(sheet_futures).await;
    for (kind, cycle, result) in results {
        match result {
            Ok(rows) => {
                for row in rows {
                    let values = row
                        .as_object()
                        .map(|obj| {
                            obj.iter()
                                .map(|(k, v)| (k.clone(), crate::numeric::to_decimal(v)))
                                .collect()
                        })
                        .unwrap_or_default();
                    let year_month = row.get("stac_yymm").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                    store
                        .upsert_sheet_row(
                            kind,
                            crate::store::entities::SheetRow {
                                code: code.to_string(),
                                sheet_class: cycle.wire().to_string(),
                                year_month,
                                values,
                            },
                        )
                        .await?;
                }
            }
            Err(e) => warn!(code, ?kind, ?cycle, error = %e, "bulk ingest: financial sheet failed"),
        }
    }

    Ok(())
}
