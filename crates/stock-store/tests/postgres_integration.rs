//! PostgreSQL 통합 테스트.
//!
//! `TEST_DATABASE_URL`이 설정된 경우에만 실행됩니다. 테스트마다 고유한 심볼을 사용해
//! 같은 데이터베이스에서 병렬 실행되어도 서로 간섭하지 않습니다.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;

use stock_core::{Candle, CandleInterval, CandleSink, CandleSource, TickerRegistry};
use stock_store::{ensure_schema, CandleRepository, Database, DatabaseConfig, TickerRepository};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::connect(&DatabaseConfig::new(url)).await.ok()?;
    ensure_schema(db.pool()).await.expect("schema");
    Some(db.pool().clone())
}

fn unique_symbol(prefix: &str) -> String {
    let nanos = Utc::now().timestamp_subsec_nanos();
    format!("{}{}", prefix, nanos % 100_000)
}

fn daily(symbol: &str, day: u32, close: Decimal, source: CandleSource) -> Candle {
    Candle {
        symbol: symbol.to_string(),
        interval: CandleInterval::Daily,
        candle_time: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
        open: dec!(100),
        high: dec!(110),
        low: dec!(95),
        close,
        volume: 1_000,
        source,
    }
}

async fn cleanup(pool: &PgPool, symbols: &[&str]) {
    for symbol in symbols {
        sqlx::query("DELETE FROM us_stock_candles WHERE symbol = $1")
            .bind(symbol)
            .execute(pool)
            .await
            .ok();
        sqlx::query("DELETE FROM managed_tickers WHERE symbol = $1")
            .bind(symbol)
            .execute(pool)
            .await
            .ok();
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let repo = CandleRepository::new(pool.clone());
    let symbol = unique_symbol("UPS");

    let first = vec![
        daily(&symbol, 13, dec!(101), CandleSource::Kis),
        daily(&symbol, 14, dec!(102), CandleSource::Kis),
    ];
    assert_eq!(repo.upsert_candles(&symbol, CandleInterval::Daily, &first).await.unwrap(), 2);

    let second = vec![
        daily(&symbol, 13, dec!(101.5), CandleSource::Kis),
        daily(&symbol, 14, dec!(102.5), CandleSource::Kis),
    ];
    assert_eq!(repo.upsert_candles(&symbol, CandleInterval::Daily, &second).await.unwrap(), 2);

    let count = repo.count_candles(&symbol, CandleInterval::Daily, CandleSource::Kis).await.unwrap();
    assert_eq!(count, 2);

    let latest = repo
        .latest_candles(&symbol, CandleInterval::Daily, CandleSource::Kis, 10)
        .await
        .unwrap();
    assert_eq!(latest[0].close, dec!(102.5));
    assert_eq!(latest[1].close, dec!(101.5));

    cleanup(&pool, &[&symbol]).await;
}

#[tokio::test]
async fn test_same_time_different_source_coexist() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let repo = CandleRepository::new(pool.clone());
    let symbol = unique_symbol("SRC");

    for source in [CandleSource::Kis, CandleSource::Yahoo, CandleSource::Tiingo] {
        let candles = vec![daily(&symbol, 15, dec!(100), source)];
        repo.upsert_candles(&symbol, CandleInterval::Daily, &candles).await.unwrap();
    }

    for source in [CandleSource::Kis, CandleSource::Yahoo, CandleSource::Tiingo] {
        let count = repo.count_candles(&symbol, CandleInterval::Daily, source).await.unwrap();
        assert_eq!(count, 1);
    }

    cleanup(&pool, &[&symbol]).await;
}

#[tokio::test]
async fn test_deactivated_ticker_leaves_active_list() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let registry = TickerRepository::new(pool.clone());
    let a = unique_symbol("AA");
    let b = unique_symbol("TS");

    registry.register(&a.to_lowercase(), "nas", None).await.unwrap();
    registry.register(&b, "NAS", Some("Tesla")).await.unwrap();
    assert!(registry.deactivate(&a).await.unwrap());

    let active: Vec<String> = registry
        .list_active()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.symbol)
        .filter(|s| *s == a || *s == b)
        .collect();
    assert_eq!(active, vec![b.clone()]);

    // 재등록은 재활성화하고 기존 이름을 유지한다
    registry.register(&b, "NYS", None).await.unwrap();
    let ticker = registry.get(&b).await.unwrap().unwrap();
    assert_eq!(ticker.exchange, "NYS");
    assert_eq!(ticker.name.as_deref(), Some("Tesla"));

    assert!(registry.activate(&a).await.unwrap());
    assert!(registry.get(&a).await.unwrap().unwrap().is_active);
    assert!(!registry.deactivate("NO_SUCH_TICKER").await.unwrap());

    cleanup(&pool, &[&a, &b]).await;
}

#[tokio::test]
async fn test_update_and_mark_collected() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let registry = TickerRepository::new(pool.clone());
    let symbol = unique_symbol("UPD");

    let id = registry.register(&symbol, "NAS", None).await.unwrap();
    assert!(!registry.update(&symbol, None, None).await.unwrap());
    assert!(registry.update(&symbol, Some("ams"), Some("Renamed")).await.unwrap());

    let before = Utc::now() - chrono::Duration::seconds(5);
    registry.mark_collected(id).await.unwrap();

    let ticker = registry.get(&symbol).await.unwrap().unwrap();
    assert_eq!(ticker.exchange, "AMS");
    assert_eq!(ticker.name.as_deref(), Some("Renamed"));
    assert!(ticker.last_collected_at.unwrap() >= before);

    cleanup(&pool, &[&symbol]).await;
}

#[tokio::test]
async fn test_ensure_schema_is_repeatable() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    ensure_schema(&pool).await.unwrap();
    ensure_schema(&pool).await.unwrap();

    let has_source: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
         WHERE table_name = 'us_stock_candles' AND column_name = 'source')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert!(has_source);
}
