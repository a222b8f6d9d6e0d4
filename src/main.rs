//! swingtrader — automated KOSPI/KOSDAQ swing-trading backend.
//!
//! Builds the token manager, rate-limited HTTP client, brokerage adapter,
//! snapshot store, and scheduler once, then hands `Arc` clones into each
//! background job, the same top-level wiring shape `betterbot-backend::main`
//! uses before spawning its own polling tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use reqwest::Client;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swingtrader_backend::broker::adapter::BrokerAdapter;
use swingtrader_backend::broker::http::RateLimitedClient;
use swingtrader_backend::broker::token;
use swingtrader_backend::config::Config;
use swingtrader_backend::notify::Notifier;
use swingtrader_backend::scheduler::Scheduler;
use swingtrader_backend::store::SnapshotStore;

/// Run a single ingest/score pass and exit, or stay up running the full
/// cron schedule plus the intraday buy/sell loop.
#[derive(Parser, Debug)]
#[command(name = "swingtrader", about = "KOSPI/KOSDAQ swing-trading backend")]
struct Cli {
    /// Run one bulk-ingest + scoring pass for both markets, then exit.
    #[arg(long)]
    once: bool,

    /// Skip placing brokerage orders; log what would have been submitted.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = Arc::new(Config::from_env()?);

    let store = Arc::new(SnapshotStore::new(&cfg.database_path)?);

    let http_client = Client::builder().timeout(Duration::from_secs(15)).build()?;

    let token_store_path = format!("{}.token", cfg.database_path);
    let token_manager = token::shared(
        http_client.clone(),
        cfg.broker_base_url().to_string(),
        cfg.broker_app_key.clone(),
        cfg.broker_app_secret.clone(),
        token_store_path,
    );

    let rate_limited = Arc::new(RateLimitedClient::new(
        http_client.clone(),
        cfg.broker_base_url().to_string(),
        cfg.broker_app_key.clone(),
        cfg.broker_app_secret.clone(),
        token_manager,
    ));

    let adapter = Arc::new(BrokerAdapter::new(rate_limited, &cfg));
    let notifier = Arc::new(Notifier::new(cfg.notify_webhook_url.clone()));

    let scheduler = Arc::new(Scheduler::new(store, adapter, notifier, cfg, cli.dry_run));

    if cli.once {
        info!("running single ingest + scoring pass");
        scheduler.run_once().await?;
        info!("single pass complete, exiting");
        return Ok(());
    }

    info!("starting background schedule");
    let handles = scheduler.spawn_all();
    for handle in handles {
        handle.await?;
    }
    Ok(())
}
