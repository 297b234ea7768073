//! 종목별 수집 결과.

use serde::{Deserialize, Serialize};

/// 한 번의 수집 패스에서 종목 하나에 대한 결과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionResult {
    pub symbol: String,
    pub success: bool,
    /// 저장(삽입 + 갱신)된 캔들 수
    pub records_saved: usize,
    pub error_message: Option<String>,
}

impl CollectionResult {
    /// 성공 결과를 생성합니다. `records_saved`가 0이면 빈 결과입니다.
    pub fn saved(symbol: impl Into<String>, records_saved: usize) -> Self {
        Self {
            symbol: symbol.into(),
            success: true,
            records_saved,
            error_message: None,
        }
    }

    /// 실패 결과를 생성합니다.
    pub fn failed(symbol: impl Into<String>, error: impl ToString) -> Self {
        Self {
            symbol: symbol.into(),
            success: false,
            records_saved: 0,
            error_message: Some(error.to_string()),
        }
    }

    /// 성공했지만 저장된 캔들이 없는 경우.
    pub fn is_empty(&self) -> bool {
        self.success && self.records_saved == 0
    }
}
