//! 캔들(OHLCV) 도메인 타입.
//!
//! - `CandleInterval` - 수집 주기 (60분봉, 일봉)
//! - `CandleSource` - 데이터 소스 식별자 (KIS, Yahoo Finance, Tiingo)
//! - `Candle` - 소스와 무관한 정규화된 캔들 레코드

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 캔들 수집 주기.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    /// 60분봉
    #[serde(rename = "60m")]
    Hour1,
    /// 일봉
    #[serde(rename = "daily")]
    Daily,
}

impl CandleInterval {
    /// DB `interval` 컬럼에 저장되는 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::Hour1 => "60m",
            CandleInterval::Daily => "daily",
        }
    }

    /// 분봉/시간봉 여부.
    pub fn is_intraday(&self) -> bool {
        matches!(self, CandleInterval::Hour1)
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleInterval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "60m" | "1h" | "hour" | "hourly" => Ok(CandleInterval::Hour1),
            "daily" | "1d" | "day" | "d" => Ok(CandleInterval::Daily),
            _ => Err(CoreError::InvalidInput(format!("알 수 없는 캔들 주기: {}", s))),
        }
    }
}

/// 캔들 데이터 소스.
///
/// `source` 컬럼은 고유 키의 일부이므로, 같은 시각의 캔들이라도
/// 소스가 다르면 별도 행으로 저장됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleSource {
    /// 한국투자증권 OpenAPI
    Kis,
    /// Yahoo Finance
    #[serde(rename = "yf")]
    Yahoo,
    /// Tiingo (IEX / End-of-Day)
    Tiingo,
}

impl CandleSource {
    /// `source` 컬럼이 추가되기 전 테이블의 기존 행에 부여되는 태그.
    pub const LEGACY: CandleSource = CandleSource::Kis;

    /// DB `source` 컬럼에 저장되는 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleSource::Kis => "kis",
            CandleSource::Yahoo => "yf",
            CandleSource::Tiingo => "tiingo",
        }
    }

    /// 로그 접두어 등에 쓰이는 표시 이름.
    pub fn display_name(&self) -> &'static str {
        match self {
            CandleSource::Kis => "KIS",
            CandleSource::Yahoo => "yfinance",
            CandleSource::Tiingo => "tiingo",
        }
    }
}

impl fmt::Display for CandleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandleSource {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kis" => Ok(CandleSource::Kis),
            "yf" | "yahoo" | "yfinance" => Ok(CandleSource::Yahoo),
            "tiingo" => Ok(CandleSource::Tiingo),
            _ => Err(CoreError::InvalidInput(format!("알 수 없는 데이터 소스: {}", s))),
        }
    }
}

/// 정규화된 캔들 레코드.
///
/// (symbol, interval, candle_time, source) 조합이 고유 키입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// 종목 심볼 (대문자)
    pub symbol: String,
    /// 수집 주기
    pub interval: CandleInterval,
    /// 캔들 시각
    pub candle_time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량 (항상 0 이상)
    pub volume: i64,
    /// 데이터 소스
    pub source: CandleSource,
}

impl Candle {
    /// 고유 키 튜플.
    pub fn key(&self) -> (&str, CandleInterval, DateTime<Utc>, CandleSource) {
        (&self.symbol, self.interval, self.candle_time, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_round_trip_strings() {
        assert_eq!(CandleInterval::Hour1.as_str(), "60m");
        assert_eq!(CandleInterval::Daily.as_str(), "daily");
        assert_eq!("60m".parse::<CandleInterval>().unwrap(), CandleInterval::Hour1);
        assert_eq!("DAILY".parse::<CandleInterval>().unwrap(), CandleInterval::Daily);
        assert!("5m".parse::<CandleInterval>().is_err());
    }

    #[test]
    fn test_serde_matches_column_values() {
        assert_eq!(serde_json::to_string(&CandleInterval::Hour1).unwrap(), "\"60m\"");
        assert_eq!(serde_json::to_string(&CandleInterval::Daily).unwrap(), "\"daily\"");
        assert_eq!(serde_json::to_string(&CandleSource::Yahoo).unwrap(), "\"yf\"");
        assert_eq!(serde_json::to_string(&CandleSource::Tiingo).unwrap(), "\"tiingo\"");
    }

    #[test]
    fn test_source_tags() {
        assert_eq!(CandleSource::Kis.as_str(), "kis");
        assert_eq!(CandleSource::Yahoo.as_str(), "yf");
        assert_eq!(CandleSource::Tiingo.as_str(), "tiingo");
        assert_eq!(CandleSource::LEGACY, CandleSource::Kis);
        assert_eq!("yfinance".parse::<CandleSource>().unwrap(), CandleSource::Yahoo);
        assert!("polygon".parse::<CandleSource>().is_err());
    }

    #[test]
    fn test_intraday() {
        assert!(CandleInterval::Hour1.is_intraday());
        assert!(!CandleInterval::Daily.is_intraday());
    }
}
