//! 종목 간 요청 딜레이 정책.

use std::time::Duration;

use stock_source::tiingo::FREE_TIER_REQUESTS_PER_HOUR;

/// 쿼터 정책의 안전 여유 (5%).
const QUOTA_SAFETY_MARGIN: f64 = 1.05;

/// 종목 간 딜레이 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// 항상 같은 딜레이
    Fixed(Duration),
    /// 윈도우당 요청 수 제한.
    ///
    /// 종목 수가 쿼터 이하이면 딜레이 없이 처리하고, 넘으면 요청을 윈도우 전체에
    /// 고르게 분산합니다.
    Quota {
        requests_per_window: u32,
        window: Duration,
    },
}

impl RateLimitPolicy {
    /// 딜레이 없음.
    pub fn none() -> Self {
        RateLimitPolicy::Fixed(Duration::ZERO)
    }

    /// Tiingo 무료 티어 (시간당 50 요청).
    pub fn tiingo_free_tier() -> Self {
        RateLimitPolicy::Quota {
            requests_per_window: FREE_TIER_REQUESTS_PER_HOUR,
            window: Duration::from_secs(3600),
        }
    }

    /// 이번 패스의 종목 수에 대한 종목 간 딜레이.
    pub fn delay_for(&self, ticker_count: usize) -> Duration {
        match *self {
            RateLimitPolicy::Fixed(delay) => delay,
            RateLimitPolicy::Quota {
                requests_per_window,
                window,
            } => {
                if requests_per_window == 0 {
                    return window;
                }
                if ticker_count <= requests_per_window as usize {
                    return Duration::ZERO;
                }
                let per_request = (window.as_secs_f64() / f64::from(requests_per_window)).ceil();
                Duration::from_millis((per_request * QUOTA_SAFETY_MARGIN * 1000.0).round() as u64)
            }
        }
    }
}
