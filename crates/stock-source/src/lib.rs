//! 캔들 데이터 소스 어댑터.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - `SourceAdapter` trait: 소스와 무관한 캔들 조회 인터페이스
//! - 한국투자증권 (KIS) 어댑터: OAuth 토큰 관리, 해외/국내 시세
//! - Yahoo Finance 어댑터
//! - Tiingo 어댑터
//! - 소스별 원시 행 → `Candle` 정규화

pub mod adapter;
pub mod error;
pub mod kis;
pub mod normalize;
pub mod tiingo;
pub mod yahoo;

pub use adapter::SourceAdapter;
pub use error::*;
pub use kis::{KisAdapter, KisConfig, UsQuote};
pub use normalize::{normalize, NormalizeError, RawCandle};
pub use tiingo::{TiingoAdapter, TiingoConfig};
pub use yahoo::{YahooAdapter, YahooConfig};
