//! 캔들 수집 시스템 전반에서 사용되는 공통 타입.

mod candle;
mod range;
mod ticker;

pub use candle::*;
pub use range::*;
pub use ticker::*;
