//! 관리 종목 저장소 (`managed_tickers`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, instrument};

use stock_core::{
    normalize_exchange, normalize_symbol, CoreResult, ManagedTicker, TickerRegistry,
};

use crate::error::Result;

/// `managed_tickers` 행.
#[derive(Debug, Clone, FromRow)]
pub struct TickerRecord {
    pub id: i32,
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_collected_at: Option<DateTime<Utc>>,
}

impl TickerRecord {
    pub fn into_ticker(self) -> ManagedTicker {
        ManagedTicker {
            id: self.id,
            symbol: self.symbol,
            exchange: self.exchange,
            name: self.name,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_collected_at: self.last_collected_at,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, symbol, name, exchange, is_active, \
     created_at, updated_at, last_collected_at FROM managed_tickers";

/// PostgreSQL 관리 종목 저장소.
#[derive(Clone)]
pub struct TickerRepository {
    pool: PgPool,
}

impl TickerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 종목을 등록하거나 기존 종목을 갱신 후 다시 활성화합니다.
    #[instrument(skip(self))]
    pub async fn register_ticker(
        &self,
        symbol: &str,
        exchange: &str,
        name: Option<&str>,
    ) -> Result<i32> {
        let symbol = normalize_symbol(symbol);
        let exchange = normalize_exchange(exchange);

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO managed_tickers (symbol, name, exchange)
            VALUES ($1, $2, $3)
            ON CONFLICT (symbol) DO UPDATE SET
                name = COALESCE(EXCLUDED.name, managed_tickers.name),
                exchange = EXCLUDED.exchange,
                is_active = TRUE,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&symbol)
        .bind(name)
        .bind(&exchange)
        .fetch_one(&self.pool)
        .await?;

        info!(symbol = %symbol, exchange = %exchange, id, "티커 추가/업데이트");
        Ok(id)
    }

    async fn set_active(&self, symbol: &str, active: bool) -> Result<bool> {
        let symbol = normalize_symbol(symbol);
        let result = sqlx::query(
            r#"
            UPDATE managed_tickers
            SET is_active = $2, updated_at = NOW()
            WHERE symbol = $1
            "#,
        )
        .bind(&symbol)
        .bind(active)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!(symbol = %symbol, active, "티커 활성 상태 변경");
        }
        Ok(updated)
    }

    async fn fetch_tickers(&self, active_only: bool) -> Result<Vec<ManagedTicker>> {
        let sql = if active_only {
            format!("{} WHERE is_active = TRUE ORDER BY symbol", SELECT_COLUMNS)
        } else {
            format!("{} ORDER BY symbol", SELECT_COLUMNS)
        };
        let records: Vec<TickerRecord> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        debug!(count = records.len(), active_only, "티커 목록 조회");
        Ok(records.into_iter().map(TickerRecord::into_ticker).collect())
    }

    /// 거래소/이름 부분 갱신. 전달되지 않은 필드는 기존 값을 유지합니다.
    #[instrument(skip(self))]
    pub async fn update_ticker(
        &self,
        symbol: &str,
        exchange: Option<&str>,
        name: Option<&str>,
    ) -> Result<bool> {
        if exchange.is_none() && name.is_none() {
            return Ok(false);
        }
        let symbol = normalize_symbol(symbol);
        let exchange = exchange.map(normalize_exchange);

        let result = sqlx::query(
            r#"
            UPDATE managed_tickers
            SET exchange = COALESCE($2, exchange),
                name = COALESCE($3, name),
                updated_at = NOW()
            WHERE symbol = $1
            "#,
        )
        .bind(&symbol)
        .bind(exchange)
        .bind(name)
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        if updated {
            info!(symbol = %symbol, "티커 수정");
        }
        Ok(updated)
    }

    pub async fn mark_collected_at_now(&self, id: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE managed_tickers
            SET last_collected_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_symbol(&self, symbol: &str) -> Result<Option<ManagedTicker>> {
        let sql = format!("{} WHERE symbol = $1", SELECT_COLUMNS);
        let record: Option<TickerRecord> = sqlx::query_as(&sql)
            .bind(normalize_symbol(symbol))
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(TickerRecord::into_ticker))
    }
}

#[async_trait]
impl TickerRegistry for TickerRepository {
    async fn register(&self, symbol: &str, exchange: &str, name: Option<&str>) -> CoreResult<i32> {
        Ok(self.register_ticker(symbol, exchange, name).await?)
    }

    async fn deactivate(&self, symbol: &str) -> CoreResult<bool> {
        Ok(self.set_active(symbol, false).await?)
    }

    async fn activate(&self, symbol: &str) -> CoreResult<bool> {
        Ok(self.set_active(symbol, true).await?)
    }

    async fn list_active(&self) -> CoreResult<Vec<ManagedTicker>> {
        Ok(self.fetch_tickers(true).await?)
    }

    async fn list_all(&self) -> CoreResult<Vec<ManagedTicker>> {
        Ok(self.fetch_tickers(false).await?)
    }

    async fn update(
        &self,
        symbol: &str,
        exchange: Option<&str>,
        name: Option<&str>,
    ) -> CoreResult<bool> {
        Ok(self.update_ticker(symbol, exchange, name).await?)
    }

    async fn mark_collected(&self, id: i32) -> CoreResult<()> {
        Ok(self.mark_collected_at_now(id).await?)
    }

    async fn get(&self, symbol: &str) -> CoreResult<Option<ManagedTicker>> {
        Ok(self.find_by_symbol(symbol).await?)
    }
}
