//! 캔들 수집 시스템의 공통 에러 타입.
//!
//! 각 크레이트는 자체 에러 타입(`SourceError`, `DataError` 등)을 가지며,
//! 크레이트 경계를 넘는 trait(`TickerRegistry`, `CandleSink`)은 이 타입을 사용합니다.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 공통 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotFound("AAPL".to_string());
        assert_eq!(err.to_string(), "찾을 수 없음: AAPL");
    }
}
