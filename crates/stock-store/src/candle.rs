//! 캔들 저장소 (`us_stock_candles`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument};

use stock_core::{Candle, CandleInterval, CandleSink, CandleSource, CoreResult};

use crate::error::{DataError, Result};

/// UNNEST 배열 하나에 담는 최대 행 수.
const UPSERT_CHUNK_SIZE: usize = 500;

/// `us_stock_candles` 행.
#[derive(Debug, Clone, FromRow)]
pub struct CandleRecord {
    pub symbol: String,
    pub interval: String,
    pub candle_time: DateTime<Utc>,
    pub open_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub close_price: Decimal,
    pub volume: i64,
    pub source: String,
}

impl CandleRecord {
    pub fn to_candle(&self) -> Result<Candle> {
        let interval = self
            .interval
            .parse::<CandleInterval>()
            .map_err(|e| DataError::InvalidData(e.to_string()))?;
        let source = self
            .source
            .parse::<CandleSource>()
            .map_err(|e| DataError::InvalidData(e.to_string()))?;

        Ok(Candle {
            symbol: self.symbol.clone(),
            interval,
            candle_time: self.candle_time,
            open: self.open_price,
            high: self.high_price,
            low: self.low_price,
            close: self.close_price,
            volume: self.volume,
            source,
        })
    }
}

/// PostgreSQL 캔들 저장소.
#[derive(Clone)]
pub struct CandleRepository {
    pool: PgPool,
}

impl CandleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 캔들을 일괄 upsert합니다.
    ///
    /// 모든 청크를 하나의 트랜잭션으로 기록하므로 중간 실패 시 아무것도 남지 않습니다.
    /// 같은 (symbol, interval, candle_time, source) 행은 OHLCV만 덮어씁니다.
    #[instrument(skip(self, candles), fields(count = candles.len()))]
    pub async fn save_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> Result<usize> {
        if candles.is_empty() {
            return Ok(0);
        }

        let interval_str = interval.as_str();
        let mut written = 0;
        let mut tx = self.pool.begin().await?;

        for chunk in candles.chunks(UPSERT_CHUNK_SIZE) {
            let symbols: Vec<&str> = chunk.iter().map(|_| symbol).collect();
            let intervals: Vec<&str> = chunk.iter().map(|_| interval_str).collect();
            let times: Vec<DateTime<Utc>> = chunk.iter().map(|c| c.candle_time).collect();
            let opens: Vec<Decimal> = chunk.iter().map(|c| c.open).collect();
            let highs: Vec<Decimal> = chunk.iter().map(|c| c.high).collect();
            let lows: Vec<Decimal> = chunk.iter().map(|c| c.low).collect();
            let closes: Vec<Decimal> = chunk.iter().map(|c| c.close).collect();
            let volumes: Vec<i64> = chunk.iter().map(|c| c.volume.max(0)).collect();
            let sources: Vec<&str> = chunk.iter().map(|c| c.source.as_str()).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO us_stock_candles
                    (symbol, interval, candle_time,
                     open_price, high_price, low_price, close_price, volume, source)
                SELECT * FROM UNNEST(
                    $1::text[], $2::text[], $3::timestamptz[],
                    $4::numeric[], $5::numeric[], $6::numeric[], $7::numeric[],
                    $8::bigint[], $9::text[]
                )
                ON CONFLICT (symbol, interval, candle_time, source) DO UPDATE SET
                    open_price = EXCLUDED.open_price,
                    high_price = EXCLUDED.high_price,
                    low_price = EXCLUDED.low_price,
                    close_price = EXCLUDED.close_price,
                    volume = EXCLUDED.volume
                "#,
            )
            .bind(&symbols)
            .bind(&intervals)
            .bind(&times)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .bind(&sources)
            .execute(&mut *tx)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;

        info!(
            symbol = symbol,
            interval = interval_str,
            written = written,
            "캔들 데이터 저장"
        );

        Ok(written)
    }

    /// 최신 캔들부터 `limit`개를 조회합니다.
    pub async fn latest_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        source: CandleSource,
        limit: i64,
    ) -> Result<Vec<Candle>> {
        let records: Vec<CandleRecord> = sqlx::query_as(
            r#"
            SELECT symbol, interval, candle_time,
                   open_price, high_price, low_price, close_price, volume, source
            FROM us_stock_candles
            WHERE symbol = $1 AND interval = $2 AND source = $3
            ORDER BY candle_time DESC
            LIMIT $4
            "#,
        )
        .bind(symbol)
        .bind(interval.as_str())
        .bind(source.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(symbol, interval = %interval, source = %source, rows = records.len(), "캔들 조회");
        records.iter().map(CandleRecord::to_candle).collect()
    }

    /// 저장된 캔들 수.
    pub async fn count_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        source: CandleSource,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM us_stock_candles
            WHERE symbol = $1 AND interval = $2 AND source = $3
            "#,
        )
        .bind(symbol)
        .bind(interval.as_str())
        .bind(source.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl CandleSink for CandleRepository {
    async fn upsert_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> CoreResult<usize> {
        Ok(self.save_candles(symbol, interval, candles).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(interval: &str, source: &str) -> CandleRecord {
        CandleRecord {
            symbol: "AAPL".into(),
            interval: interval.into(),
            candle_time: Utc::now(),
            open_price: dec!(187.15),
            high_price: dec!(188.44),
            low_price: dec!(186.9),
            close_price: dec!(188.01),
            volume: 51_203_000,
            source: source.into(),
        }
    }

    #[test]
    fn test_record_to_candle() {
        let candle = record("daily", "tiingo").to_candle().unwrap();
        assert_eq!(candle.interval, CandleInterval::Daily);
        assert_eq!(candle.source, CandleSource::Tiingo);
        assert_eq!(candle.close, dec!(188.01));
    }

    #[test]
    fn test_unknown_source_is_invalid_data() {
        let err = record("60m", "bloomberg").to_candle().unwrap_err();
        assert!(matches!(err, DataError::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_store() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://nobody@127.0.0.1:1/none")
            .unwrap();
        let repo = CandleRepository::new(pool);
        assert_eq!(repo.save_candles("AAPL", CandleInterval::Daily, &[]).await.unwrap(), 0);
    }
}
