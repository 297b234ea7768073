//! 소스 어댑터 trait.

use async_trait::async_trait;

use stock_core::{CandleInterval, CandleSource, FetchRange, ManagedTicker};

use crate::normalize::RawCandle;

/// 캔들 데이터 소스.
///
/// KIS, Yahoo Finance, Tiingo가 이 trait을 구현하며 스케줄러는 어댑터 종류와
/// 무관하게 동작합니다.
///
/// `fetch_candles`는 실패하지 않습니다. 전송 실패, 2xx 이외의 상태, API 에러 코드,
/// 빈 응답은 모두 (symbol, status, body)와 함께 로그로 남기고 빈 `Vec`을 반환합니다.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// 어댑터가 반환하는 원시 행 타입.
    type Raw: RawCandle + Send + Sync;

    /// 저장 시 `source` 컬럼에 기록되는 태그.
    fn source(&self) -> CandleSource;

    /// 종목의 캔들을 조회합니다.
    async fn fetch_candles(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Vec<Self::Raw>;
}
