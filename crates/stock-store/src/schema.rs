//! 테이블 생성 및 마이그레이션.
//!
//! 모든 구문은 `IF NOT EXISTS` 또는 존재 여부 검사로 감싸 여러 번 실행해도 안전합니다.
//! prepared statement는 구문 하나만 받으므로 한 구문씩 실행합니다.

use sqlx::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{DataError, Result};

/// 관리 종목 테이블.
const MANAGED_TICKERS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS managed_tickers (
        id SERIAL PRIMARY KEY,
        symbol VARCHAR(20) NOT NULL,
        name VARCHAR(100),
        exchange VARCHAR(10) NOT NULL DEFAULT 'NAS',
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_collected_at TIMESTAMPTZ,
        CONSTRAINT uq_managed_tickers_symbol UNIQUE(symbol)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_managed_tickers_active
        ON managed_tickers(is_active) WHERE is_active = TRUE
    "#,
];

/// 캔들 테이블.
const US_STOCK_CANDLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS us_stock_candles (
        id SERIAL PRIMARY KEY,
        symbol TEXT NOT NULL,
        interval TEXT NOT NULL,
        candle_time TIMESTAMPTZ NOT NULL,
        open_price NUMERIC(18, 4) NOT NULL,
        high_price NUMERIC(18, 4) NOT NULL,
        low_price NUMERIC(18, 4) NOT NULL,
        close_price NUMERIC(18, 4) NOT NULL,
        volume BIGINT NOT NULL,
        source TEXT NOT NULL DEFAULT 'kis',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT uq_us_stock_candles UNIQUE(symbol, interval, candle_time, source)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_us_stock_candles_lookup
        ON us_stock_candles(symbol, interval, candle_time DESC)
    "#,
];

/// `source` 컬럼이 없던 캔들 테이블을 4컬럼 유니크 키로 옮깁니다.
///
/// 기존 행은 모두 KIS 수집분이므로 기본값 `'kis'`로 채워집니다.
const MIGRATE_CANDLE_SOURCE: &str = r#"
    DO $$
    BEGIN
        IF NOT EXISTS (
            SELECT 1 FROM information_schema.columns
            WHERE table_name = 'us_stock_candles' AND column_name = 'source'
        ) THEN
            ALTER TABLE us_stock_candles ADD COLUMN source TEXT NOT NULL DEFAULT 'kis';
            ALTER TABLE us_stock_candles DROP CONSTRAINT IF EXISTS uq_us_stock_candles;
            DROP INDEX IF EXISTS uq_us_stock_candles;
            ALTER TABLE us_stock_candles
                ADD CONSTRAINT uq_us_stock_candles UNIQUE(symbol, interval, candle_time, source);
        END IF;
    END $$
"#;

const CANDLE_SOURCE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_us_stock_candles_source
        ON us_stock_candles(source)
"#;

/// 관리 종목/캔들 테이블을 준비합니다.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in MANAGED_TICKERS {
        execute(pool, statement).await?;
    }
    debug!("managed_tickers 테이블 확인");

    for statement in US_STOCK_CANDLES {
        execute(pool, statement).await?;
    }
    execute(pool, MIGRATE_CANDLE_SOURCE).await?;
    execute(pool, CANDLE_SOURCE_INDEX).await?;

    info!("스키마 확인 완료 (managed_tickers, us_stock_candles)");
    Ok(())
}

async fn execute(pool: &PgPool, statement: &str) -> Result<()> {
    sqlx::query(statement)
        .execute(pool)
        .await
        .map_err(|e| DataError::MigrationError(e.to_string()))?;
    Ok(())
}
