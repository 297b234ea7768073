//! PostgreSQL 저장소.
//!
//! 이 crate는 다음을 제공합니다:
//! - 연결 풀 설정 및 생성 (`Database`)
//! - 스키마 생성 및 `source` 컬럼 마이그레이션
//! - 관리 종목 저장소 (`TickerRepository`, `TickerRegistry` 구현)
//! - 캔들 저장소 (`CandleRepository`, `CandleSink` 구현)

pub mod candle;
pub mod db;
pub mod error;
pub mod schema;
pub mod ticker;

pub use candle::{CandleRecord, CandleRepository};
pub use db::{Database, DatabaseConfig};
pub use error::{DataError, Result};
pub use schema::ensure_schema;
pub use ticker::{TickerRecord, TickerRepository};
