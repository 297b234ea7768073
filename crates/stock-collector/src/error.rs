//! 에러 타입 정의.

use stock_core::CoreError;
use stock_source::SourceError;
use stock_store::DataError;
use thiserror::Error;

/// Collector 에러 타입
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 데이터베이스 연결/스키마 에러
    #[error("Database error: {0}")]
    Database(#[from] DataError),

    /// 설정 에러 (필수 환경변수 누락 등)
    #[error("Configuration error: {0}")]
    Config(String),

    /// 데이터 소스 에러 (어댑터 생성 실패 등)
    #[error("Data source error: {0}")]
    DataSource(String),

    /// 저장소 호출 에러
    #[error("Store error: {0}")]
    Store(#[from] CoreError),

    /// 등록되지 않은 종목
    #[error("Ticker not found: {0}")]
    TickerNotFound(String),
}

impl From<SourceError> for CollectorError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Config(msg) => Self::Config(msg),
            other => Self::DataSource(other.to_string()),
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
