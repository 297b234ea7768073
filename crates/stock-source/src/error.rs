//! 소스 어댑터 에러 타입.
//!
//! 어댑터 내부에서만 사용됩니다. `SourceAdapter::fetch_candles`는 이 에러를
//! 로그로 남기고 빈 결과를 반환하므로 스케줄러까지 전파되지 않습니다.

use thiserror::Error;

/// 데이터 소스 관련 에러.
#[derive(Debug, Error)]
pub enum SourceError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 인증/토큰 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 상태 코드 에러
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// API 응답 코드 에러 (KIS `rt_cd != "0"` 등)
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    /// 응답 파싱 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 설정 에러 (API 키 누락 등)
    #[error("Config error: {0}")]
    Config(String),
}

/// 소스 작업용 Result 타입.
pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
    /// 인증 에러인지 확인.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SourceError::Unauthorized(_))
            || matches!(self, SourceError::Http { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}
