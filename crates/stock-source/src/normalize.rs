//! 소스별 원시 행 → 표준 `Candle` 변환.
//!
//! 각 어댑터의 원시 행 타입이 [`RawCandle`]을 구현하고, [`normalize`]가
//! 배치 단위로 변환합니다. 변환에 실패한 행은 경고 로그를 남기고 버리며
//! 나머지 행의 변환은 계속됩니다.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

use stock_core::{Candle, CandleInterval};

/// 행 변환 에러.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    /// 필수 필드 누락
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// 숫자 파싱 실패
    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// 날짜/시각 파싱 실패
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// 표준 캔들로 변환 가능한 원시 행.
pub trait RawCandle {
    fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError>;
}

/// 원시 행 배치를 캔들로 변환합니다.
///
/// 결과는 `candle_time` 오름차순이며, 같은 시각의 행이 여러 개면 마지막 행을 사용합니다.
pub fn normalize<R: RawCandle>(symbol: &str, interval: CandleInterval, rows: &[R]) -> Vec<Candle> {
    let mut candles = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;

    for (index, row) in rows.iter().enumerate() {
        match row.to_candle(symbol, interval) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                dropped += 1;
                warn!(symbol, interval = %interval, index, error = %e, "Dropping malformed candle row");
            }
        }
    }

    // 안정 정렬 후 역순 dedup으로 같은 시각의 마지막 행을 남긴다
    candles.sort_by_key(|c| c.candle_time);
    candles.reverse();
    candles.dedup_by_key(|c| c.candle_time);
    candles.reverse();

    if dropped > 0 {
        warn!(symbol, interval = %interval, dropped, kept = candles.len(), "Some rows were dropped during normalization");
    }

    candles
}

/// 공백만 있는 문자열 필드를 None으로 취급합니다.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 문자열 가격 필드를 Decimal로 파싱합니다.
pub(crate) fn parse_decimal(field: &'static str, value: Option<&str>) -> Result<Decimal, NormalizeError> {
    let raw = value.map(str::trim).filter(|s| !s.is_empty()).ok_or(NormalizeError::MissingField(field))?;
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| NormalizeError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

/// 실수 가격 필드를 Decimal로 변환합니다. NaN/무한대는 실패합니다.
pub(crate) fn decimal_from_f64(field: &'static str, value: Option<f64>) -> Result<Decimal, NormalizeError> {
    let value = value.ok_or(NormalizeError::MissingField(field))?;
    if !value.is_finite() {
        return Err(NormalizeError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(6).normalize())
        .ok_or(NormalizeError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

/// 거래량 문자열을 음이 아닌 정수로 변환합니다. 없거나 잘못된 값은 0입니다.
pub(crate) fn parse_volume(value: Option<&str>) -> i64 {
    let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };
    let parsed = raw
        .parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64));
    parsed.unwrap_or(0).max(0)
}

/// 실수 거래량을 음이 아닌 정수로 변환합니다.
pub(crate) fn volume_from_f64(value: Option<f64>) -> i64 {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => v as i64,
        _ => 0,
    }
}

/// 일봉 시각: 거래일의 00:00 UTC.
pub fn daily_anchor(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// `YYYYMMDD` 날짜를 파싱합니다.
pub(crate) fn parse_yyyymmdd(value: &str) -> Result<NaiveDate, NormalizeError> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .map_err(|_| NormalizeError::InvalidTimestamp(value.to_string()))
}

/// 거래소 현지 시각(`YYYYMMDD`, `HHMMSS`)을 UTC로 변환합니다.
///
/// 서머타임 전환으로 모호한 시각은 이른 쪽을 사용합니다.
pub(crate) fn local_to_utc(tz: Tz, date: &str, time: &str) -> Result<DateTime<Utc>, NormalizeError> {
    let combined = format!("{}{}", date.trim(), time.trim());
    let naive = NaiveDateTime::parse_from_str(&combined, "%Y%m%d%H%M%S")
        .map_err(|_| NormalizeError::InvalidTimestamp(combined.clone()))?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(NormalizeError::InvalidTimestamp(combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stock_core::CandleSource;

    struct Row {
        ts: i64,
        close: &'static str,
    }

    impl RawCandle for Row {
        fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError> {
            let close = parse_decimal("close", Some(self.close))?;
            Ok(Candle {
                symbol: symbol.to_string(),
                interval,
                candle_time: Utc.timestamp_opt(self.ts, 0).single().unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 0,
                source: CandleSource::Kis,
            })
        }
    }

    #[test]
    fn test_malformed_row_is_dropped() {
        let rows = vec![
            Row { ts: 100, close: "1.5" },
            Row { ts: 200, close: "abc" },
            Row { ts: 300, close: "2.5" },
            Row { ts: 400, close: "3.5" },
        ];
        let candles = normalize("AAPL", CandleInterval::Hour1, &rows);
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[2].close, dec!(3.5));
    }

    #[test]
    fn test_duplicate_timestamps_keep_last_and_sort() {
        let rows = vec![
            Row { ts: 300, close: "3" },
            Row { ts: 100, close: "1" },
            Row { ts: 100, close: "1.1" },
        ];
        let candles = normalize("AAPL", CandleInterval::Daily, &rows);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, dec!(1.1));
        assert_eq!(candles[1].close, dec!(3));
    }

    #[test]
    fn test_parse_volume_rules() {
        assert_eq!(parse_volume(Some("1200")), 1200);
        assert_eq!(parse_volume(Some("1200.7")), 1200);
        assert_eq!(parse_volume(Some("-5")), 0);
        assert_eq!(parse_volume(Some("n/a")), 0);
        assert_eq!(parse_volume(None), 0);
        assert_eq!(volume_from_f64(Some(f64::NAN)), 0);
    }

    #[test]
    fn test_decimal_parsing() {
        assert_eq!(parse_decimal("open", Some(" 187.4400 ")).unwrap(), dec!(187.44));
        assert_eq!(parse_decimal("open", Some("")), Err(NormalizeError::MissingField("open")));
        assert!(decimal_from_f64("close", Some(f64::INFINITY)).is_err());
        assert_eq!(decimal_from_f64("close", Some(187.5)).unwrap(), dec!(187.5));
    }

    #[test]
    fn test_local_to_utc_new_york() {
        // 2024-07-01 10:30 EDT = 14:30 UTC
        let dt = local_to_utc(chrono_tz::America::New_York, "20240701", "103000").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-07-01T14:30:00+00:00");
        // 2024-01-02 10:30 EST = 15:30 UTC
        let dt = local_to_utc(chrono_tz::America::New_York, "20240102", "103000").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-02T15:30:00+00:00");
    }

    #[test]
    fn test_daily_anchor() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(daily_anchor(date).to_rfc3339(), "2024-03-15T00:00:00+00:00");
    }
}
