//! 저장소 추상화.
//!
//! 스케줄러는 이 trait들에만 의존하며, PostgreSQL 구현은 `stock-store`
//! 크레이트에 있습니다. 테스트에서는 메모리 구현으로 대체할 수 있습니다.

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::{Candle, CandleInterval, ManagedTicker};

/// 관리 종목 저장소.
///
/// 모든 호출은 저장소에 직접 반영되며 프로세스 내 캐시를 두지 않습니다.
#[async_trait]
pub trait TickerRegistry: Send + Sync {
    /// 종목을 등록하고 id를 반환합니다.
    ///
    /// 이미 존재하는 심볼이면 거래소를 갱신하고 다시 활성화합니다.
    /// `name`이 없으면 기존 이름을 유지합니다.
    async fn register(&self, symbol: &str, exchange: &str, name: Option<&str>) -> CoreResult<i32>;

    /// 종목을 비활성화합니다. 존재하지 않으면 `false`.
    async fn deactivate(&self, symbol: &str) -> CoreResult<bool>;

    /// 종목을 다시 활성화합니다. 존재하지 않으면 `false`.
    async fn activate(&self, symbol: &str) -> CoreResult<bool>;

    /// 활성 종목을 심볼 오름차순으로 조회합니다.
    async fn list_active(&self) -> CoreResult<Vec<ManagedTicker>>;

    /// 비활성 종목을 포함한 전체 종목을 조회합니다.
    async fn list_all(&self) -> CoreResult<Vec<ManagedTicker>>;

    /// 거래소/이름을 부분 갱신합니다.
    ///
    /// 둘 다 `None`이면 저장소를 건드리지 않고 `false`를 반환합니다.
    async fn update(
        &self,
        symbol: &str,
        exchange: Option<&str>,
        name: Option<&str>,
    ) -> CoreResult<bool>;

    /// `last_collected_at`을 현재 시각으로 기록합니다.
    async fn mark_collected(&self, id: i32) -> CoreResult<()>;

    /// 심볼로 종목을 조회합니다.
    async fn get(&self, symbol: &str) -> CoreResult<Option<ManagedTicker>>;
}

/// 캔들 저장소.
#[async_trait]
pub trait CandleSink: Send + Sync {
    /// 캔들을 upsert하고 기록된 행 수(삽입 + 갱신)를 반환합니다.
    ///
    /// (symbol, interval, candle_time, source)가 같은 행은 OHLCV만 덮어씁니다.
    /// 빈 입력이면 저장소를 건드리지 않고 0을 반환합니다.
    async fn upsert_candles(
        &self,
        symbol: &str,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> CoreResult<usize>;
}
