//! 환경변수 기반 설정 모듈.

use chrono::NaiveTime;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use stock_source::kis::config::{DEFAULT_TOKEN_FILE, KIS_REAL_BASE_URL};
use stock_source::tiingo::TIINGO_BASE_URL;
use stock_source::{KisConfig, TiingoConfig};
use stock_store::DatabaseConfig;

use crate::error::CollectorError;
use crate::rate_limit::RateLimitPolicy;
use crate::Result;

/// Collector 전체 설정
#[derive(Debug)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 풀의 최대 연결 수
    pub db_max_connections: u32,
    /// KIS 인증 정보 (없으면 KIS 명령 사용 불가)
    pub kis: Option<KisSettings>,
    /// Tiingo 인증 정보 (없으면 Tiingo 명령 사용 불가)
    pub tiingo: Option<TiingoSettings>,
    /// 요청 간 딜레이 설정
    pub delays: DelayConfig,
    /// 데몬 스케줄 설정
    pub schedule: ScheduleConfig,
}

/// KIS 인증 설정
#[derive(Debug)]
pub struct KisSettings {
    pub base_url: String,
    pub app_key: String,
    pub app_secret: SecretString,
    /// 토큰 파일 캐시 경로
    pub token_file: String,
}

/// Tiingo 인증 설정
#[derive(Debug)]
pub struct TiingoSettings {
    pub api_key: SecretString,
    pub base_url: String,
}

/// 소스별 종목 간 딜레이
#[derive(Debug, Clone)]
pub struct DelayConfig {
    /// KIS 요청 간 딜레이 (밀리초)
    pub kis_ms: u64,
    /// Yahoo 요청 간 딜레이 (밀리초)
    pub yahoo_ms: u64,
    /// Tiingo 요청 간 딜레이 (밀리초). 없으면 무료 티어 쿼터로 계산
    pub tiingo_ms: Option<u64>,
}

/// 데몬 스케줄 설정
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// 60분봉 수집 주기 (분 단위)
    pub interval_60m_minutes: u64,
    /// 일봉 수집 시각 (로컬 시간)
    pub daily_collect_time: NaiveTime,
    /// Yahoo 60분봉에 프리/애프터마켓 포함
    pub yf_extended_hours: bool,
    /// Tiingo 60분봉 조회 일수
    pub tiingo_days_60m: u32,
    /// Tiingo 일봉 조회 일수
    pub tiingo_days_daily: u32,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: database_url_from_env()?,
            db_max_connections: env_var_parse("DB_MAX_CONNECTIONS", 5),
            kis: kis_from_env(),
            tiingo: tiingo_from_env(),
            delays: DelayConfig {
                kis_ms: env_var_parse("API_REQUEST_DELAY_MS", 500),
                yahoo_ms: env_var_parse("YF_REQUEST_DELAY_MS", 1000),
                tiingo_ms: env_var_opt("TIINGO_REQUEST_DELAY_MS"),
            },
            schedule: ScheduleConfig {
                interval_60m_minutes: env_var_parse("CANDLE_60M_INTERVAL_MINUTES", 60),
                daily_collect_time: daily_time_from_env()?,
                yf_extended_hours: env_var_bool("YF_EXTENDED_HOURS", true),
                tiingo_days_60m: env_var_parse("TIINGO_DAYS_60M", 5),
                tiingo_days_daily: env_var_parse("TIINGO_DAYS_DAILY", 30),
            },
        })
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone()).with_max_connections(self.db_max_connections)
    }

    /// KIS 어댑터 설정. 인증 정보가 없으면 설정 에러.
    pub fn kis_config(&self) -> Result<KisConfig> {
        let kis = self.kis.as_ref().ok_or_else(|| {
            CollectorError::Config(
                "KIS_APP_KEY / KIS_APP_SECRET 환경변수가 설정되지 않았습니다".to_string(),
            )
        })?;
        Ok(KisConfig::new(kis.app_key.clone(), kis.app_secret.expose_secret())
            .with_base_url(kis.base_url.clone())
            .with_token_file(kis.token_file.clone()))
    }

    /// Tiingo 어댑터 설정. API 키가 없으면 설정 에러.
    pub fn tiingo_config(&self) -> Result<TiingoConfig> {
        let tiingo = self.tiingo.as_ref().ok_or_else(|| {
            CollectorError::Config("TIINGO_API_KEY 환경변수가 설정되지 않았습니다".to_string())
        })?;
        Ok(TiingoConfig::new(tiingo.api_key.expose_secret()).with_base_url(tiingo.base_url.clone()))
    }
}

impl DelayConfig {
    pub fn kis_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::Fixed(Duration::from_millis(self.kis_ms))
    }

    pub fn yahoo_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::Fixed(Duration::from_millis(self.yahoo_ms))
    }

    pub fn tiingo_policy(&self) -> RateLimitPolicy {
        match self.tiingo_ms {
            Some(ms) => RateLimitPolicy::Fixed(Duration::from_millis(ms)),
            None => RateLimitPolicy::tiingo_free_tier(),
        }
    }
}

impl ScheduleConfig {
    /// 60분봉 수집 주기를 Duration으로 반환
    pub fn interval_60m(&self) -> Duration {
        Duration::from_secs(self.interval_60m_minutes.max(1) * 60)
    }
}

/// `DATABASE_URL`, 없으면 `DB_HOST` 등 개별 항목으로 URL을 조립합니다.
fn database_url_from_env() -> Result<String> {
    if let Some(url) = env_var_opt::<String>("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
        return Ok(url);
    }
    let host = env_var_opt::<String>("DB_HOST").ok_or_else(|| {
        CollectorError::Config(
            "DATABASE_URL (또는 DB_HOST) 환경변수가 설정되지 않았습니다".to_string(),
        )
    })?;
    Ok(build_database_url(
        &host,
        env_var_parse("DB_PORT", 5432),
        &env_var_parse("DB_NAME", "stocks".to_string()),
        &env_var_parse("DB_ID", "stocks".to_string()),
        &env_var_parse("DB_PASSWORD", String::new()),
    ))
}

fn build_database_url(host: &str, port: u16, name: &str, user: &str, password: &str) -> String {
    if password.is_empty() {
        format!("postgresql://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, name)
    }
}

fn kis_from_env() -> Option<KisSettings> {
    let app_key = env_var_opt::<String>("KIS_APP_KEY").filter(|v| !v.is_empty())?;
    let app_secret = env_var_opt::<String>("KIS_APP_SECRET").filter(|v| !v.is_empty())?;
    Some(KisSettings {
        base_url: env_var_parse("KIS_BASE_URL", KIS_REAL_BASE_URL.to_string()),
        app_key,
        app_secret: SecretString::from(app_secret),
        token_file: env_var_parse("KIS_TOKEN_FILE", DEFAULT_TOKEN_FILE.to_string()),
    })
}

fn tiingo_from_env() -> Option<TiingoSettings> {
    let api_key = env_var_opt::<String>("TIINGO_API_KEY")
        .or_else(|| env_var_opt("Tiingo_API_KEY"))
        .filter(|v| !v.is_empty())?;
    Some(TiingoSettings {
        api_key: SecretString::from(api_key),
        base_url: env_var_parse("TIINGO_BASE_URL", TIINGO_BASE_URL.to_string()),
    })
}

fn daily_time_from_env() -> Result<NaiveTime> {
    let raw = env_var_parse("DAILY_CANDLE_COLLECT_TIME", "07:00".to_string());
    parse_daily_time(&raw)
}

/// `HH:MM` 형식의 일일 수집 시각을 파싱합니다.
pub fn parse_daily_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
        CollectorError::Config(format!(
            "DAILY_CANDLE_COLLECT_TIME 형식이 잘못되었습니다 (HH:MM): {}",
            raw
        ))
    })
}

fn env_var_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var_opt(key).unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daily_time() {
        assert_eq!(parse_daily_time("07:00").unwrap(), NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(parse_daily_time(" 16:30 ").unwrap(), NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        assert!(matches!(parse_daily_time("7am"), Err(CollectorError::Config(_))));
    }

    #[test]
    fn test_build_database_url() {
        assert_eq!(
            build_database_url("postgres", 5432, "stocks", "stocks", "pw"),
            "postgresql://stocks:pw@postgres:5432/stocks"
        );
        assert_eq!(
            build_database_url("localhost", 6543, "db", "me", ""),
            "postgresql://me@localhost:6543/db"
        );
    }

    #[test]
    fn test_env_helpers_fall_back_to_default() {
        assert_eq!(env_var_parse("STOCK_COLLECTOR_TEST_UNSET_NUMBER", 42u64), 42);
        assert!(env_var_bool("STOCK_COLLECTOR_TEST_UNSET_BOOL", true));
        assert_eq!(env_var_opt::<u64>("STOCK_COLLECTOR_TEST_UNSET_NUMBER"), None);
    }

    #[test]
    fn test_tiingo_policy_defaults_to_quota() {
        let delays = DelayConfig {
            kis_ms: 500,
            yahoo_ms: 1000,
            tiingo_ms: None,
        };
        assert_eq!(delays.tiingo_policy(), RateLimitPolicy::tiingo_free_tier());
        assert_eq!(delays.kis_policy(), RateLimitPolicy::Fixed(Duration::from_millis(500)));

        let fixed = DelayConfig {
            tiingo_ms: Some(3000),
            ..delays
        };
        assert_eq!(fixed.tiingo_policy(), RateLimitPolicy::Fixed(Duration::from_secs(3)));
    }

    #[test]
    fn test_missing_credentials_are_config_errors() {
        let config = CollectorConfig {
            database_url: "postgresql://localhost/stocks".into(),
            db_max_connections: 5,
            kis: None,
            tiingo: None,
            delays: DelayConfig {
                kis_ms: 500,
                yahoo_ms: 1000,
                tiingo_ms: None,
            },
            schedule: ScheduleConfig {
                interval_60m_minutes: 60,
                daily_collect_time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                yf_extended_hours: true,
                tiingo_days_60m: 5,
                tiingo_days_daily: 30,
            },
        };
        assert!(matches!(config.kis_config(), Err(CollectorError::Config(_))));
        assert!(matches!(config.tiingo_config(), Err(CollectorError::Config(_))));
        assert_eq!(config.schedule.interval_60m(), Duration::from_secs(3600));
    }
}
