//! 예약 실행 캔들 수집기.
//!
//! 이 crate는 다음을 제공합니다:
//! - 소스와 무관한 캔들 수집 스케줄러 (`CandleCollector`)
//! - 소스별 요청 딜레이 정책 (`RateLimitPolicy`)
//! - 환경변수 설정 (`CollectorConfig`)
//! - 수집 통계 (`CollectionStats`)

pub mod collector;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod stats;

pub use collector::{next_daily_run, CandleCollector, Schedule};
pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use rate_limit::RateLimitPolicy;
pub use stats::CollectionStats;
