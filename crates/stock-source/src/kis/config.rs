//! 한국투자증권 (KIS) API 설정.
//!
//! 시세 조회만 사용하므로 계좌번호는 필요하지 않고 app_key/app_secret만 있으면 됩니다.

use secrecy::SecretString;
use std::path::PathBuf;

/// 실전투자 REST API 기본 URL.
pub const KIS_REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";

/// 기본 토큰 캐시 파일 이름.
pub const DEFAULT_TOKEN_FILE: &str = ".access_token.json";

/// KIS API 설정.
#[derive(Debug)]
pub struct KisConfig {
    /// REST API 기본 URL
    pub base_url: String,
    /// 앱키
    pub app_key: String,
    /// 앱시크릿
    pub app_secret: SecretString,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 접근 토큰 파일 캐시 경로 (None이면 메모리에만 보관)
    pub token_file: Option<PathBuf>,
}

impl KisConfig {
    /// 실전투자 URL로 설정을 생성합니다.
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            base_url: KIS_REAL_BASE_URL.to_string(),
            app_key: app_key.into(),
            app_secret: SecretString::from(app_secret.into()),
            timeout_secs: 10,
            token_file: None,
        }
    }

    /// 기본 URL을 변경합니다 (모의투자 서버, 테스트 서버 등).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 토큰 파일 캐시 경로를 설정합니다.
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    /// 요청 타임아웃을 설정합니다.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_builder() {
        let config = KisConfig::new("key", "secret")
            .with_base_url("http://127.0.0.1:1234/")
            .with_token_file("/tmp/token.json");
        assert_eq!(config.base_url, "http://127.0.0.1:1234");
        assert_eq!(config.app_secret.expose_secret(), "secret");
        assert_eq!(config.timeout_secs, 10);
        assert!(config.token_file.is_some());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = KisConfig::new("key", "very-secret-value");
        assert!(!format!("{:?}", config).contains("very-secret-value"));
    }
}
