//! 조회 범위(얼마나 과거까지 요청할지) 타입.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 소스 어댑터에 요청할 과거 데이터 범위.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchRange {
    /// 오늘 기준 최근 N일 (달력 기준)
    Days(u32),
    /// Yahoo 형식 기간 문자열 (`5d`, `1mo`, `1y` 등)
    Period(String),
    /// 시작/종료일 (양 끝 포함)
    Dates { start: NaiveDate, end: NaiveDate },
    /// 가장 최근 N개 행
    Recent(u32),
}

impl FetchRange {
    /// 범위를 (시작일, 종료일)로 변환합니다. 종료일은 오늘(UTC)입니다.
    ///
    /// `Period`의 `max`는 1970-01-01, `ytd`는 올해 1월 1일부터입니다.
    /// `Recent(n)`은 거래일 기준 n개를 덮도록 달력 일수로 넉넉히 환산합니다.
    pub fn to_dates(&self) -> (NaiveDate, NaiveDate) {
        let today = Utc::now().date_naive();
        self.to_dates_from(today)
    }

    /// 기준일을 지정해 (시작일, 종료일)을 계산합니다.
    pub fn to_dates_from(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            FetchRange::Days(days) => (today - Duration::days(i64::from(*days)), today),
            FetchRange::Period(period) => (period_start(period, today), today),
            FetchRange::Dates { start, end } => (*start, *end),
            FetchRange::Recent(count) => {
                // 주말/휴일을 감안해 거래일 5일당 달력 7일 + 여유분
                let calendar_days = i64::from(*count) * 7 / 5 + 7;
                (today - Duration::days(calendar_days), today)
            }
        }
    }

    /// 범위가 포함하는 달력 일수.
    pub fn calendar_days(&self) -> i64 {
        let (start, end) = self.to_dates();
        (end - start).num_days().max(0)
    }

    /// 달력 일수를 `max_days` 이하로 제한한 범위를 반환합니다.
    pub fn clamp_days(&self, max_days: u32) -> FetchRange {
        let days = self.calendar_days().clamp(0, i64::from(max_days));
        FetchRange::Days(days as u32)
    }
}

impl fmt::Display for FetchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchRange::Days(days) => write!(f, "{}d", days),
            FetchRange::Period(period) => f.write_str(period),
            FetchRange::Dates { start, end } => write!(f, "{}..{}", start, end),
            FetchRange::Recent(count) => write!(f, "recent {}", count),
        }
    }
}

/// Yahoo 형식 기간 문자열의 시작일.
///
/// 알 수 없는 문자열은 `1mo`로 취급합니다.
fn period_start(period: &str, today: NaiveDate) -> NaiveDate {
    let days = match period.trim().to_lowercase().as_str() {
        "1d" => 1,
        "5d" => 5,
        "1mo" => 30,
        "3mo" => 90,
        "6mo" => 180,
        "1y" => 365,
        "2y" => 730,
        "5y" => 1825,
        "10y" => 3650,
        "ytd" => {
            return NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
        }
        "max" => return NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(today),
        _ => 30,
    };
    today - Duration::days(days)
}
