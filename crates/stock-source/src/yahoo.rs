//! Yahoo Finance 캔들 어댑터.
//!
//! 인증이 필요 없으며 `yahoo_finance_api` 크레이트로 차트 API를 호출합니다.
//!
//! - 60분봉: 최근 5일(달력 기준)까지만 조회, 프리/애프터마켓 포함 여부 선택
//! - 일봉: 기간 문자열(`1mo`, `1y` 등) 또는 날짜 범위
//!
//! # 심볼 형식
//!
//! - 미국 주식: "AAPL"
//! - 국내 주식: "005930.KS" (코스피), "247540.KQ" (코스닥)

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use yahoo_finance_api as yahoo;

use stock_core::{Candle, CandleInterval, CandleSource, FetchRange, ManagedTicker};

use crate::adapter::SourceAdapter;
use crate::error::{SourceError, SourceResult};
use crate::normalize::{daily_anchor, decimal_from_f64, volume_from_f64, NormalizeError, RawCandle};

/// Yahoo 60분봉 조회 가능 기간 (달력 일수).
pub const MAX_INTRADAY_DAYS: u32 = 5;

/// Yahoo 차트 API가 허용하는 기간 문자열.
pub const VALID_PERIODS: &[&str] = &[
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

/// Yahoo Finance 원시 캔들.
#[derive(Debug, Clone, PartialEq)]
pub struct YahooBar {
    /// Unix timestamp (초)
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    /// 일봉 거래일 판정에 사용할 거래소 시간대
    pub exchange_tz: Tz,
}

impl RawCandle for YahooBar {
    fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError> {
        let instant = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .ok_or_else(|| NormalizeError::InvalidTimestamp(self.timestamp.to_string()))?;
        let candle_time = match interval {
            CandleInterval::Hour1 => instant,
            CandleInterval::Daily => daily_anchor(instant.with_timezone(&self.exchange_tz).date_naive()),
        };

        Ok(Candle {
            symbol: symbol.to_string(),
            interval,
            candle_time,
            open: decimal_from_f64("open", Some(self.open))?,
            high: decimal_from_f64("high", Some(self.high))?,
            low: decimal_from_f64("low", Some(self.low))?,
            close: decimal_from_f64("close", Some(self.close))?,
            volume: volume_from_f64(Some(self.volume as f64)),
            source: CandleSource::Yahoo,
        })
    }
}

/// Yahoo 어댑터 설정.
#[derive(Debug, Clone, Copy)]
pub struct YahooConfig {
    /// 60분봉에 프리/애프터마켓 포함
    pub extended_hours: bool,
}

impl Default for YahooConfig {
    fn default() -> Self {
        Self {
            extended_hours: true,
        }
    }
}

/// Yahoo Finance 어댑터.
pub struct YahooAdapter {
    connector: yahoo::YahooConnector,
    config: YahooConfig,
}

impl YahooAdapter {
    pub fn new(config: YahooConfig) -> SourceResult<Self> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| SourceError::Network(format!("Yahoo Finance 연결 실패: {}", e)))?;
        Ok(Self { connector, config })
    }

    pub fn config(&self) -> YahooConfig {
        self.config
    }

    /// 수집 주기를 Yahoo 간격 문자열로 변환.
    pub fn interval_str(interval: CandleInterval) -> &'static str {
        match interval {
            CandleInterval::Hour1 => "1h",
            CandleInterval::Daily => "1d",
        }
    }

    /// 등록된 종목을 Yahoo 심볼로 변환합니다.
    pub fn yahoo_symbol(ticker: &ManagedTicker) -> String {
        if ticker.is_domestic() {
            let suffix = if ticker.exchange.eq_ignore_ascii_case("KOSDAQ") {
                "KQ"
            } else {
                "KS"
            };
            format!("{}.{}", ticker.symbol, suffix)
        } else {
            // BRK.B 형식은 Yahoo에서 BRK-B
            ticker.symbol.replace('.', "-")
        }
    }

    fn exchange_tz(ticker: &ManagedTicker) -> Tz {
        if ticker.is_domestic() {
            chrono_tz::Asia::Seoul
        } else {
            chrono_tz::America::New_York
        }
    }

    async fn fetch(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> SourceResult<Vec<YahooBar>> {
        let symbol = Self::yahoo_symbol(ticker);
        let interval_str = Self::interval_str(interval);
        let prepost = interval.is_intraday() && self.config.extended_hours;
        let range = effective_range(interval, range);

        debug!(symbol = %symbol, interval = interval_str, range = %range, prepost, "Requesting Yahoo chart");

        let response = match &range {
            FetchRange::Period(period) => self
                .connector
                .get_quote_period_interval(&symbol, period, interval_str, prepost)
                .await,
            other => {
                let (start, end) = other.to_dates();
                self.connector
                    .get_quote_history_interval_prepost(
                        &symbol,
                        to_offset_datetime(start)?,
                        to_offset_datetime(end + Duration::days(1))?,
                        interval_str,
                        prepost,
                    )
                    .await
            }
        }
        .map_err(|e| SourceError::Api {
            code: "yahoo".to_string(),
            message: format!("{}: {}", symbol, e),
        })?;

        let quotes = match response.quotes() {
            Ok(quotes) => quotes,
            Err(e) => {
                debug!(symbol = %symbol, error = %e, "Yahoo response has no quotes");
                return Ok(Vec::new());
            }
        };

        let tz = Self::exchange_tz(ticker);
        let mut bars: Vec<YahooBar> = quotes
            .iter()
            .map(|q| YahooBar {
                timestamp: q.timestamp as i64,
                open: q.open,
                high: q.high,
                low: q.low,
                close: q.close,
                volume: q.volume,
                exchange_tz: tz,
            })
            .collect();

        bars.sort_by_key(|b| b.timestamp);
        if let FetchRange::Recent(count) = range {
            let skip = bars.len().saturating_sub(count as usize);
            bars.drain(..skip);
        }

        Ok(bars)
    }
}

#[async_trait]
impl SourceAdapter for YahooAdapter {
    type Raw = YahooBar;

    fn source(&self) -> CandleSource {
        CandleSource::Yahoo
    }

    async fn fetch_candles(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Vec<YahooBar> {
        match self.fetch(ticker, interval, range).await {
            Ok(bars) => {
                if bars.is_empty() {
                    warn!(symbol = %ticker.symbol, interval = %interval, "Yahoo Finance returned no candles");
                } else {
                    info!(symbol = %ticker.symbol, interval = %interval, rows = bars.len(), "Yahoo Finance candles fetched");
                }
                bars
            }
            Err(e) => {
                warn!(symbol = %ticker.symbol, interval = %interval, error = %e, "Yahoo Finance fetch failed");
                Vec::new()
            }
        }
    }
}

/// 60분봉 요청 범위를 최근 [`MAX_INTRADAY_DAYS`]일로 제한하고, 알 수 없는 기간 문자열은
/// 날짜 범위로 바꿉니다.
fn effective_range(interval: CandleInterval, range: &FetchRange) -> FetchRange {
    if interval.is_intraday() {
        return match range {
            FetchRange::Period(p) if matches!(p.as_str(), "1d" | "5d") => range.clone(),
            FetchRange::Recent(_) => range.clone(),
            FetchRange::Dates { end, .. } => {
                let (start, _) = range.to_dates();
                let floor = Utc::now().date_naive() - Duration::days(i64::from(MAX_INTRADAY_DAYS));
                FetchRange::Dates {
                    start: start.max(floor),
                    end: *end,
                }
            }
            other => other.clamp_days(MAX_INTRADAY_DAYS),
        };
    }
    match range {
        FetchRange::Period(p) if !VALID_PERIODS.contains(&p.as_str()) => {
            let (start, end) = range.to_dates();
            FetchRange::Dates { start, end }
        }
        other => other.clone(),
    }
}

fn to_offset_datetime(date: NaiveDate) -> SourceResult<OffsetDateTime> {
    let ts = daily_anchor(date).timestamp();
    OffsetDateTime::from_unix_timestamp(ts).map_err(|e| SourceError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker(symbol: &str, exchange: &str) -> ManagedTicker {
        let now = Utc::now();
        ManagedTicker {
            id: 1,
            symbol: symbol.into(),
            exchange: exchange.into(),
            name: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_collected_at: None,
        }
    }

    fn bar(timestamp: i64, close: f64) -> YahooBar {
        YahooBar {
            timestamp,
            open: 100.0,
            high: 101.0,
            low: 99.5,
            close,
            volume: 1_000,
            exchange_tz: chrono_tz::America::New_York,
        }
    }

    #[test]
    fn test_yahoo_symbol() {
        assert_eq!(YahooAdapter::yahoo_symbol(&ticker("AAPL", "NAS")), "AAPL");
        assert_eq!(YahooAdapter::yahoo_symbol(&ticker("BRK.B", "NYS")), "BRK-B");
        assert_eq!(YahooAdapter::yahoo_symbol(&ticker("005930", "KRX")), "005930.KS");
        assert_eq!(YahooAdapter::yahoo_symbol(&ticker("247540", "KOSDAQ")), "247540.KQ");
    }

    #[test]
    fn test_daily_bar_anchored_to_trade_date() {
        // 2024-03-15 13:30 UTC (09:30 EDT 개장)
        let candle = bar(1_710_509_400, 172.62).to_candle("AAPL", CandleInterval::Daily).unwrap();
        assert_eq!(candle.candle_time.to_rfc3339(), "2024-03-15T00:00:00+00:00");
        assert_eq!(candle.close, dec!(172.62));
        assert_eq!(candle.source, CandleSource::Yahoo);
    }

    #[test]
    fn test_hourly_bar_keeps_instant() {
        let candle = bar(1_710_509_400, 172.62).to_candle("AAPL", CandleInterval::Hour1).unwrap();
        assert_eq!(candle.candle_time.timestamp(), 1_710_509_400);
    }

    #[test]
    fn test_non_finite_price_fails() {
        assert!(bar(1_710_509_400, f64::NAN).to_candle("AAPL", CandleInterval::Hour1).is_err());
    }

    #[test]
    fn test_intraday_range_clamped() {
        assert_eq!(
            effective_range(CandleInterval::Hour1, &FetchRange::Days(30)),
            FetchRange::Days(5)
        );
        assert_eq!(
            effective_range(CandleInterval::Hour1, &FetchRange::Period("5d".into())),
            FetchRange::Period("5d".into())
        );
        assert_eq!(
            effective_range(CandleInterval::Hour1, &FetchRange::Period("1mo".into())),
            FetchRange::Days(5)
        );
        assert_eq!(
            effective_range(CandleInterval::Daily, &FetchRange::Period("1mo".into())),
            FetchRange::Period("1mo".into())
        );
    }
}
