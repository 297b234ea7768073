//! KIS OAuth 2.0 인증 모듈.
//!
//! - 접근 토큰 발급 (POST /oauth2/tokenP, client credentials)
//! - 만료 60초 전부터는 새 토큰을 발급 ([`ensure_valid_token`])
//! - 메모리 + JSON 파일 캐시 ([`TokenCache`])
//!
//! KIS는 토큰 발급을 1분에 1회로 제한하므로 어댑터 하나가 토큰 하나를 소유하고
//! 재사용합니다.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::config::KisConfig;
use crate::error::{SourceError, SourceResult};

/// 만료 시각보다 이만큼 일찍 토큰을 갱신합니다.
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// 응답에 만료 정보가 없을 때의 기본 유효 기간 (24시간).
const DEFAULT_EXPIRES_IN_SECS: i64 = 86_400;

/// KIS 날짜시간 형식.
const KIS_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 접근 토큰.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// `now` 기준으로 버퍼를 고려해 아직 사용할 수 있는지 확인합니다.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS)
    }

    /// `authorization` 헤더 값.
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.value)
    }
}

/// 토큰 재사용/재발급 판단 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenDecision {
    /// 현재 토큰을 그대로 사용
    Reuse(AccessToken),
    /// 새 토큰 발급 필요
    Refresh,
}

/// 현재 토큰을 계속 쓸지 새로 발급할지 결정합니다.
///
/// 토큰이 없거나 `expires_at - 60초`를 지났으면 `Refresh`입니다.
pub fn ensure_valid_token(current: Option<&AccessToken>, now: DateTime<Utc>) -> TokenDecision {
    match current {
        Some(token) if token.is_usable_at(now) => TokenDecision::Reuse(token.clone()),
        _ => TokenDecision::Refresh,
    }
}

/// 토큰 파일 형식.
#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
    /// KST 기준 "YYYY-MM-DD HH:MM:SS"
    expires_at: String,
}

/// 메모리 + 선택적 파일 토큰 캐시.
#[derive(Debug, Default)]
pub struct TokenCache {
    memory: Option<AccessToken>,
    file: Option<PathBuf>,
}

impl TokenCache {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { memory: None, file }
    }

    /// 현재 토큰. 메모리에 없으면 파일에서 읽어 메모리에 올립니다.
    pub fn current(&mut self) -> Option<&AccessToken> {
        if self.memory.is_none() {
            if let Some(path) = &self.file {
                self.memory = read_token_file(path);
            }
        }
        self.memory.as_ref()
    }

    /// 새 토큰을 저장합니다. 파일 쓰기 실패는 경고만 남깁니다.
    pub fn store(&mut self, token: AccessToken) {
        if let Some(path) = &self.file {
            if let Err(e) = write_token_file(path, &token) {
                warn!(path = %path.display(), error = %e, "Failed to write KIS token file");
            }
        }
        self.memory = Some(token);
    }

    /// 메모리의 토큰을 버립니다 (파일은 유지).
    pub fn clear(&mut self) {
        self.memory = None;
    }
}

fn read_token_file(path: &Path) -> Option<AccessToken> {
    let content = std::fs::read_to_string(path).ok()?;
    let file: TokenFile = match serde_json::from_str(&content) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Invalid KIS token file, ignoring");
            return None;
        }
    };
    let expires_at = parse_kis_datetime(&file.expires_at)?;
    debug!(expires_at = %expires_at, "Loaded KIS token from file");
    Some(AccessToken::new(file.access_token, expires_at))
}

fn write_token_file(path: &Path, token: &AccessToken) -> SourceResult<()> {
    let file = TokenFile {
        access_token: token.value.clone(),
        expires_at: format_kis_datetime(token.expires_at),
    };
    let content = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, content).map_err(|e| SourceError::Config(e.to_string()))
}

/// KIS OAuth 토큰 응답.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    /// 만료 시각 (KST "YYYY-MM-DD HH:MM:SS")
    #[serde(default)]
    access_token_token_expired: Option<String>,
}

/// KIS OAuth 오류 응답.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error_code: String,
    error_description: String,
}

/// KIS OAuth 인증 관리자.
pub struct KisOAuth {
    config: KisConfig,
    client: Client,
    cache: Mutex<TokenCache>,
}

impl KisOAuth {
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `SourceError::Network`를 반환합니다.
    pub fn new(config: KisConfig) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Network(format!("HTTP client 생성 실패: {}", e)))?;
        let cache = Mutex::new(TokenCache::new(config.token_file.clone()));

        Ok(Self {
            config,
            client,
            cache,
        })
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 유효한 접근 토큰을 반환합니다. 필요하면 새로 발급합니다.
    ///
    /// 발급 중에는 캐시 잠금을 유지하므로 동시에 두 번 발급하지 않습니다.
    pub async fn get_token(&self) -> SourceResult<AccessToken> {
        let mut cache = self.cache.lock().await;
        match ensure_valid_token(cache.current(), Utc::now()) {
            TokenDecision::Reuse(token) => {
                debug!(expires_at = %token.expires_at, "Using cached KIS token");
                Ok(token)
            }
            TokenDecision::Refresh => {
                let token = self.request_token().await?;
                cache.store(token.clone());
                Ok(token)
            }
        }
    }

    /// 메모리의 토큰을 버려 다음 요청에서 재발급하게 합니다.
    pub async fn invalidate(&self) {
        self.cache.lock().await.clear();
    }

    async fn request_token(&self) -> SourceResult<AccessToken> {
        if self.config.app_key.is_empty() || self.config.app_secret.expose_secret().is_empty() {
            return Err(SourceError::Config(
                "KIS_APP_KEY / KIS_APP_SECRET이 설정되지 않았습니다".to_string(),
            ));
        }

        info!(
            app_key_prefix = %self.config.app_key.chars().take(8).collect::<String>(),
            "Requesting new KIS access token"
        );

        let url = format!("{}/oauth2/tokenP", self.config.base_url);

        #[derive(Serialize)]
        struct TokenRequest<'a> {
            grant_type: &'a str,
            appkey: &'a str,
            appsecret: &'a str,
        }

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&TokenRequest {
                grant_type: "client_credentials",
                appkey: &self.config.app_key,
                appsecret: self.config.app_secret.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "KIS token request failed");
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(SourceError::Unauthorized(format!(
                    "{} ({})",
                    oauth_error.error_description, oauth_error.error_code
                )));
            }
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let token_resp: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("Failed to parse token response: {}", e)))?;

        if token_resp.access_token.is_empty() {
            return Err(SourceError::Unauthorized(format!(
                "토큰 응답에 access_token이 없습니다: {}",
                body
            )));
        }

        let expires_at = token_resp
            .access_token_token_expired
            .as_deref()
            .and_then(parse_kis_datetime)
            .unwrap_or_else(|| {
                Utc::now() + Duration::seconds(token_resp.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS))
            });

        info!(expires_at = %expires_at, "KIS access token obtained");
        Ok(AccessToken::new(token_resp.access_token, expires_at))
    }

    /// 시세 조회용 공통 헤더를 생성합니다.
    pub async fn build_headers(&self, tr_id: &str) -> SourceResult<HeaderMap> {
        let token = self.get_token().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Type",
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert("authorization", header_value("authorization", &token.auth_header())?);
        headers.insert("appkey", header_value("appkey", &self.config.app_key)?);
        headers.insert(
            "appsecret",
            header_value("appsecret", self.config.app_secret.expose_secret())?,
        );
        headers.insert("tr_id", header_value("tr_id", tr_id)?);
        headers.insert("custtype", HeaderValue::from_static("P"));

        Ok(headers)
    }
}

fn header_value(name: &str, value: &str) -> SourceResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| SourceError::Config(format!("{} 헤더에 유효하지 않은 문자 포함", name)))
}

/// KIS 날짜시간 형식 파싱 ("YYYY-MM-DD HH:MM:SS", KST).
pub(crate) fn parse_kis_datetime(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), KIS_DATETIME_FORMAT).ok()?;
    let kst = Seoul.from_local_datetime(&naive).single()?;
    Some(kst.with_timezone(&Utc))
}

fn format_kis_datetime(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Seoul).format(KIS_DATETIME_FORMAT).to_string()
}
