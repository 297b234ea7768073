//! Tiingo 캔들 어댑터.
//!
//! - 일봉: `/tiingo/daily/{SYMBOL}/prices` (수정주가 우선, 없으면 원본 값)
//! - 60분봉: `/iex/{SYMBOL}/prices?resampleFreq=1hour` (최근 5일, 거래량 없음)
//!
//! 인증은 `Authorization: Token <API_KEY>` 헤더를 사용합니다.
//! 무료 요금제는 시간당 50회로 제한되며, 요청 간격은 스케줄러의 쿼터 정책이 관리합니다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use stock_core::{Candle, CandleInterval, CandleSource, FetchRange, ManagedTicker};

use crate::adapter::SourceAdapter;
use crate::error::{SourceError, SourceResult};
use crate::normalize::{
    daily_anchor, decimal_from_f64, non_empty, volume_from_f64, NormalizeError, RawCandle,
};

/// Tiingo REST API 기본 URL.
pub const TIINGO_BASE_URL: &str = "https://api.tiingo.com";

/// IEX 60분봉 조회 가능 기간 (달력 일수).
pub const MAX_INTRADAY_DAYS: u32 = 5;

/// 무료 요금제 시간당 요청 한도.
pub const FREE_TIER_REQUESTS_PER_HOUR: u32 = 50;

/// Tiingo 원시 캔들 (일봉/IEX 공통).
///
/// 필드는 느슨하게 역직렬화합니다. 날짜가 없거나 가격이 숫자가 아닌 행도 배열 전체를
/// 실패시키지 않고 남겨 두었다가 정규화 단계에서 해당 행만 버립니다.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TiingoBar {
    /// ISO-8601 시각
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub close: Option<f64>,
    /// IEX 응답에는 없음
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub adj_open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub adj_high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub adj_low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub adj_close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub adj_volume: Option<f64>,
}

/// 숫자 또는 숫자 문자열. 그 밖의 값은 NaN이 되어 정규화에서 실패합니다.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => Some(s.trim().parse().unwrap_or(f64::NAN)),
        Some(_) => Some(f64::NAN),
    })
}

/// 문자열이 아닌 값은 문자열로 바꿔 두고 시각 파싱에서 실패시킵니다.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl RawCandle for TiingoBar {
    fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError> {
        let date = non_empty(&self.date).ok_or(NormalizeError::MissingField("date"))?;
        let instant: DateTime<Utc> = DateTime::parse_from_rfc3339(date)
            .map_err(|_| NormalizeError::InvalidTimestamp(date.to_string()))?
            .with_timezone(&Utc);

        let (candle_time, open, high, low, close, volume) = match interval {
            CandleInterval::Daily => (
                daily_anchor(instant.date_naive()),
                self.adj_open.or(self.open),
                self.adj_high.or(self.high),
                self.adj_low.or(self.low),
                self.adj_close.or(self.close),
                self.adj_volume.or(self.volume),
            ),
            CandleInterval::Hour1 => (instant, self.open, self.high, self.low, self.close, self.volume),
        };

        Ok(Candle {
            symbol: symbol.to_string(),
            interval,
            candle_time,
            open: decimal_from_f64("open", open)?,
            high: decimal_from_f64("high", high)?,
            low: decimal_from_f64("low", low)?,
            close: decimal_from_f64("close", close)?,
            volume: volume_from_f64(volume),
            source: CandleSource::Tiingo,
        })
    }
}

/// Tiingo 어댑터 설정.
#[derive(Debug)]
pub struct TiingoConfig {
    pub api_key: SecretString,
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// IEX 60분봉에 장외 거래 포함
    pub after_hours: bool,
}

impl TiingoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: TIINGO_BASE_URL.to_string(),
            timeout_secs: 30,
            after_hours: true,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_after_hours(mut self, after_hours: bool) -> Self {
        self.after_hours = after_hours;
        self
    }
}

/// Tiingo 어댑터.
pub struct TiingoAdapter {
    config: TiingoConfig,
    client: Client,
}

impl TiingoAdapter {
    pub fn new(config: TiingoConfig) -> SourceResult<Self> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(SourceError::Config("TIINGO_API_KEY가 설정되지 않았습니다".to_string()));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Network(format!("HTTP client 생성 실패: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn get_bars(&self, path: &str, query: &[(&str, String)]) -> SourceResult<Vec<TiingoBar>> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Content-Type", "application/json")
            .header(
                "Authorization",
                format!("Token {}", self.config.api_key.expose_secret()),
            )
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::SymbolNotFound(path.to_string()));
        }
        if !status.is_success() {
            error!(path, status = status.as_u16(), body = %body, "Tiingo request failed");
            return Err(SourceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| SourceError::Parse(format!("Tiingo 응답 파싱 실패: {} (body: {})", e, body)))?;

        // 객체가 아닌 행만 여기서 버리고 나머지 검증은 정규화 단계에 맡깁니다
        let mut bars = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<TiingoBar>(row) {
                Ok(bar) => bars.push(bar),
                Err(e) => warn!(path, index, error = %e, "Dropping unparseable Tiingo row"),
            }
        }
        Ok(bars)
    }

    /// 일봉 조회 (양 끝 날짜 포함).
    pub async fn get_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> SourceResult<Vec<TiingoBar>> {
        let path = format!("/tiingo/daily/{}/prices", symbol.to_lowercase());
        self.get_bars(
            &path,
            &[
                ("startDate", start.format("%Y-%m-%d").to_string()),
                ("endDate", end.format("%Y-%m-%d").to_string()),
            ],
        )
        .await
    }

    /// IEX 60분봉 조회.
    pub async fn get_hourly(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> SourceResult<Vec<TiingoBar>> {
        let path = format!("/iex/{}/prices", symbol.to_lowercase());
        self.get_bars(
            &path,
            &[
                ("startDate", start.format("%Y-%m-%d").to_string()),
                ("endDate", end.format("%Y-%m-%d").to_string()),
                ("resampleFreq", "1hour".to_string()),
                ("afterHours", self.config.after_hours.to_string()),
            ],
        )
        .await
    }

    async fn fetch(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> SourceResult<Vec<TiingoBar>> {
        let (mut start, end) = range.to_dates();
        let mut bars = match interval {
            CandleInterval::Daily => self.get_daily(&ticker.symbol, start, end).await?,
            CandleInterval::Hour1 => {
                start = start.max(end - Duration::days(i64::from(MAX_INTRADAY_DAYS)));
                self.get_hourly(&ticker.symbol, start, end).await?
            }
        };
        debug!(symbol = %ticker.symbol, %start, %end, rows = bars.len(), "Tiingo bars received");

        if let FetchRange::Recent(count) = range {
            let skip = bars.len().saturating_sub(*count as usize);
            bars.drain(..skip);
        }
        Ok(bars)
    }
}

#[async_trait]
impl SourceAdapter for TiingoAdapter {
    type Raw = TiingoBar;

    fn source(&self) -> CandleSource {
        CandleSource::Tiingo
    }

    async fn fetch_candles(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Vec<TiingoBar> {
        if ticker.is_domestic() {
            debug!(symbol = %ticker.symbol, "Tiingo does not cover domestic symbols, skipping");
            return Vec::new();
        }

        match self.fetch(ticker, interval, range).await {
            Ok(bars) => {
                if bars.is_empty() {
                    warn!(symbol = %ticker.symbol, interval = %interval, "Tiingo returned no candles");
                } else {
                    info!(symbol = %ticker.symbol, interval = %interval, rows = bars.len(), "Tiingo candles fetched");
                }
                bars
            }
            Err(SourceError::SymbolNotFound(_)) => {
                warn!(symbol = %ticker.symbol, "Tiingo: symbol not found");
                Vec::new()
            }
            Err(e) => {
                warn!(symbol = %ticker.symbol, interval = %interval, error = %e, "Tiingo fetch failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;

    fn ticker(symbol: &str) -> ManagedTicker {
        let now = Utc::now();
        ManagedTicker {
            id: 7,
            symbol: symbol.into(),
            exchange: "NAS".into(),
            name: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_collected_at: None,
        }
    }

    fn adapter(server: &mockito::ServerGuard) -> TiingoAdapter {
        TiingoAdapter::new(TiingoConfig::new("test-key").with_base_url(server.url())).unwrap()
    }

    #[test]
    fn test_daily_prefers_adjusted_fields() {
        let bar = TiingoBar {
            date: Some("2024-03-15T00:00:00.000Z".into()),
            open: Some(100.0),
            high: Some(110.0),
            low: Some(90.0),
            close: Some(105.0),
            volume: Some(1000.0),
            adj_open: Some(50.0),
            adj_high: Some(55.0),
            adj_low: Some(45.0),
            adj_close: Some(52.5),
            adj_volume: Some(2000.0),
        };
        let candle = bar.to_candle("AAPL", CandleInterval::Daily).unwrap();
        assert_eq!(candle.open, dec!(50));
        assert_eq!(candle.close, dec!(52.5));
        assert_eq!(candle.volume, 2000);
        assert_eq!(candle.candle_time.to_rfc3339(), "2024-03-15T00:00:00+00:00");
    }

    #[test]
    fn test_daily_falls_back_to_raw_fields() {
        let bar = TiingoBar {
            date: Some("2024-03-15T00:00:00.000Z".into()),
            open: Some(100.0),
            high: Some(110.0),
            low: Some(90.0),
            close: Some(105.0),
            volume: Some(1000.0),
            ..Default::default()
        };
        let candle = bar.to_candle("AAPL", CandleInterval::Daily).unwrap();
        assert_eq!(candle.close, dec!(105));
        assert_eq!(candle.volume, 1000);
    }

    #[test]
    fn test_iex_bar_has_zero_volume() {
        let bar = TiingoBar {
            date: Some("2024-03-15T14:00:00.000Z".into()),
            open: Some(1.0),
            high: Some(2.0),
            low: Some(0.5),
            close: Some(1.5),
            ..Default::default()
        };
        let candle = bar.to_candle("AAPL", CandleInterval::Hour1).unwrap();
        assert_eq!(candle.volume, 0);
        assert_eq!(candle.candle_time.to_rfc3339(), "2024-03-15T14:00:00+00:00");
        assert_eq!(candle.source, CandleSource::Tiingo);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        assert!(matches!(
            TiingoAdapter::new(TiingoConfig::new("  ")),
            Err(SourceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_daily_request_uses_token_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tiingo/daily/aapl/prices")
            .match_header("authorization", "Token test-key")
            .match_query(Matcher::AllOf(vec![
                Matcher::Regex("startDate=".into()),
                Matcher::Regex("endDate=".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"[
                    {"date":"2024-03-14T00:00:00.000Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":10,
                     "adjOpen":1,"adjHigh":2,"adjLow":0.5,"adjClose":1.5,"adjVolume":10},
                    {"date":"2024-03-15T00:00:00.000Z","open":1,"high":2,"low":0.5,"close":1.6,"volume":12}
                ]"#,
            )
            .create_async()
            .await;

        let bars = adapter(&server)
            .fetch_candles(&ticker("AAPL"), CandleInterval::Daily, &FetchRange::Days(30))
            .await;
        assert_eq!(bars.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_iex_request_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/iex/aapl/prices")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("resampleFreq".into(), "1hour".into()),
                Matcher::UrlEncoded("afterHours".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"date":"2024-03-15T14:00:00.000Z","open":1,"high":2,"low":0.5,"close":1.5}]"#)
            .create_async()
            .await;

        let bars = adapter(&server)
            .fetch_candles(&ticker("AAPL"), CandleInterval::Hour1, &FetchRange::Days(30))
            .await;
        assert_eq!(bars.len(), 1);
        mock.assert_async().await;
    }

    #[test]
    fn test_lenient_row_fields() {
        let bar: TiingoBar = serde_json::from_str(
            r#"{"date":"2024-03-15T00:00:00.000Z","open":"101.5","high":102,"low":null,"close":"n/a"}"#,
        )
        .unwrap();
        assert_eq!(bar.open, Some(101.5));
        assert_eq!(bar.low, None);
        assert!(bar.close.unwrap().is_nan());
        assert!(matches!(
            bar.to_candle("AAPL", CandleInterval::Daily),
            Err(NormalizeError::MissingField("low"))
        ));

        let undated: TiingoBar = serde_json::from_str(r#"{"open":1,"high":2,"low":0.5,"close":1.5}"#).unwrap();
        assert!(matches!(
            undated.to_candle("AAPL", CandleInterval::Daily),
            Err(NormalizeError::MissingField("date"))
        ));
    }

    #[tokio::test]
    async fn test_malformed_rows_do_not_discard_batch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tiingo/daily/aapl/prices")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[
                    {"date":"2024-03-13T00:00:00.000Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":10},
                    {"open":1,"high":2,"low":0.5,"close":1.5,"volume":10},
                    {"date":"2024-03-14T00:00:00.000Z","open":1,"high":2,"low":0.5,"close":"n/a","volume":10},
                    "garbage",
                    {"date":"2024-03-15T00:00:00.000Z","open":1,"high":2,"low":0.5,"close":1.7,"volume":12}
                ]"#,
            )
            .create_async()
            .await;

        let bars = adapter(&server)
            .fetch_candles(&ticker("AAPL"), CandleInterval::Daily, &FetchRange::Days(30))
            .await;
        assert_eq!(bars.len(), 4);

        let candles = crate::normalize::normalize("AAPL", CandleInterval::Daily, &bars);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, dec!(1.5));
        assert_eq!(candles[1].close, dec!(1.7));
        assert_eq!(candles[1].volume, 12);
    }

    #[tokio::test]
    async fn test_not_found_returns_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tiingo/daily/nope/prices")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body(r#"{"detail":"Error: Ticker 'NOPE' not found"}"#)
            .create_async()
            .await;

        let bars = adapter(&server)
            .fetch_candles(&ticker("NOPE"), CandleInterval::Daily, &FetchRange::Days(30))
            .await;
        assert!(bars.is_empty());
    }
}
