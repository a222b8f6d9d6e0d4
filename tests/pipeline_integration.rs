//! End-to-end pipeline test: populate the snapshot store the way a bulk
//! ingest run would, then run the scoring engine against a real on-disk
//! SQLite file and check the qualified candidate lands in both
//! `score_cards` and `trade_info`.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use swingtrader_backend::config::Config;
use swingtrader_backend::scoring::ScoringEngine;
use swingtrader_backend::store::entities::{EquitySnapshot, PriceBar, SheetRow, Ticker};
use swingtrader_backend::store::SnapshotStore;

async fn seed(store: &SnapshotStore) {
    store
        .upsert_ticker(Ticker {
            code: "005930".to_string(),
            market: "KOSPI".to_string(),
            short_name: "Samsung".to_string(),
            corporate_name: "Samsung Electronics".to_string(),
            sector: "Tech".to_string(),
            created_at: "2026-01-01".to_string(),
        })
        .await
        .unwrap();

    store
        .upsert_equity_snapshot(EquitySnapshot {
            code: "005930".to_string(),
            rate_vs_year_high: -35.0,
            rate_vs_year_low: 8.0,
            listed_shares: 600_000_000,
            foreign_net_buy_qty: 1_200_000,
            program_net_buy_qty: 500_000,
            foreign_hold_qty: 70_000_000,
            per: 4.0,
            pbr: 0.8,
            ..Default::default()
        })
        .await
        .unwrap();

    // 15 bars (oldest to newest) so RSI/OBV have enough history; the most
    // recent bar's close (9000) is kept consistent with the ma5/ma20/ma60
    // fields below (ma60 > ma20, close above both) so trend_score clears
    // its floor instead of gating the whole row out the way a close
    // disjoint from the ma fields would.
    let closes = [1000, 1005, 995, 985, 975, 965, 955, 945, 935, 925, 915, 905, 895, 885, 9000];
    let heavy_volume_indices = [1usize, 14usize];
    for (i, &close) in closes.iter().enumerate() {
        let is_latest = i == closes.len() - 1;
        store
            .upsert_price_bar(PriceBar {
                code: "005930".to_string(),
                session_date: format!("202601{:02}", i + 1),
                close,
                volume: if heavy_volume_indices.contains(&i) { 100_000 } else { 1 },
                ma5: if is_latest { 8300.0 } else { 0.0 },
                ma20: if is_latest { 8400.0 } else { 0.0 },
                ma60: if is_latest { 8500.0 } else { 0.0 },
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let mut ratio_values = BTreeMap::new();
    ratio_values.insert("revenue_growth_rate".to_string(), Decimal::new(120, 1));
    ratio_values.insert("operating_profit_rate".to_string(), Decimal::new(150, 1));
    ratio_values.insert("reserve_rate".to_string(), Decimal::new(6000, 1));
    ratio_values.insert("debt_rate".to_string(), Decimal::new(600, 1));
    store
        .upsert_sheet_row(
            swingtrader_backend::broker::types::SheetKind::Ratio,
            SheetRow {
                code: "005930".to_string(),
                sheet_class: "0".to_string(),
                year_month: "202412".to_string(),
                values: ratio_values,
            },
        )
        .await
        .unwrap();

    let mut income_values = BTreeMap::new();
    income_values.insert("net_income".to_string(), Decimal::new(1, 0));
    store
        .upsert_sheet_row(
            swingtrader_backend::broker::types::SheetKind::Income,
            SheetRow {
                code: "005930".to_string(),
                sheet_class: "1".to_string(),
                year_month: "202412".to_string(),
                values: income_values,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn scoring_run_persists_a_qualified_score_card_and_marks_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("swingtrader_test.db");
    let store = std::sync::Arc::new(SnapshotStore::new(db_path.to_str().unwrap()).unwrap());

    seed(&store).await;

    let cfg = std::sync::Arc::new(Config::from_env().unwrap());
    let engine = ScoringEngine::new(store.clone(), cfg);
    engine.run().await.unwrap();

    let bars = store.price_bars_newest_first("005930").await.unwrap();
    assert_eq!(bars.len(), 15);

    let key = swingtrader_backend::store::entities::CodeDateKey {
        code: "005930".to_string(),
        session_date: swingtrader_backend::clock::today(),
    };
    let info = store.get_trade_info(key).await.unwrap().expect("trade_info row should exist after scoring");
    assert_eq!(info.candidate, "Y");
    assert_eq!(info.strategy, "SW");

    let candidates = store.swing_candidates(&swingtrader_backend::clock::today()).await.unwrap();
    assert!(candidates.iter().any(|c| c.code == "005930"));
}
