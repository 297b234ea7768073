//! # Stock Core
//!
//! 캔들 수집기의 도메인 모델과 저장소 추상화를 제공합니다.
//!
//! - 관리 종목, 캔들, 수집 주기, 데이터 소스 타입
//! - 조회 범위(`FetchRange`)와 종목별 수집 결과
//! - `TickerRegistry` / `CandleSink` trait
//! - 로깅 초기화

pub mod collection;
pub mod error;
pub mod logging;
pub mod registry;
pub mod types;

pub use collection::*;
pub use error::*;
pub use logging::*;
pub use registry::*;
pub use types::*;
