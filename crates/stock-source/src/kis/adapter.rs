//! KIS 캔들 어댑터.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use stock_core::{Candle, CandleInterval, CandleSource, FetchRange, ManagedTicker};

use super::auth::KisOAuth;
use super::client_kr::{retain_since, KisKrClient, KrCandleRow};
use super::client_us::{KisUsClient, UsCandleRow, UsQuote, MAX_MINUTE_ROWS};
use super::config::KisConfig;
use super::exchange_code;
use crate::adapter::SourceAdapter;
use crate::error::SourceResult;
use crate::normalize::{non_empty, parse_yyyymmdd, NormalizeError, RawCandle};

/// 미국 정규장 + 연장 거래 기준 하루 60분봉 개수 (대략).
const HOURLY_BARS_PER_DAY: i64 = 16;

/// KIS 원시 캔들 (해외/국내).
#[derive(Debug, Clone)]
pub enum KisRawCandle {
    Us(UsCandleRow),
    Kr(KrCandleRow),
}

impl RawCandle for KisRawCandle {
    fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError> {
        match self {
            KisRawCandle::Us(row) => row.to_candle(symbol, interval),
            KisRawCandle::Kr(row) => row.to_candle(symbol, interval),
        }
    }
}

/// 한국투자증권 OpenAPI 어댑터.
///
/// 해외/국내 클라이언트가 하나의 토큰을 공유합니다.
pub struct KisAdapter {
    us: KisUsClient,
    kr: KisKrClient,
}

impl KisAdapter {
    pub fn new(config: KisConfig) -> SourceResult<Self> {
        let oauth = Arc::new(KisOAuth::new(config)?);
        Ok(Self {
            us: KisUsClient::new(Arc::clone(&oauth)),
            kr: KisKrClient::new(oauth),
        })
    }

    /// 미국 주식 현재가 (NAS → NYS → AMS).
    pub async fn quote(&self, symbol: &str) -> SourceResult<Option<UsQuote>> {
        self.us.get_quote(symbol).await
    }

    /// 종목의 KIS 거래소 코드를 결정합니다.
    ///
    /// 등록된 거래소가 미국 거래소면 그대로 사용하고, 아니면 현재가 조회로 찾습니다.
    async fn resolve_excd(&self, ticker: &ManagedTicker) -> SourceResult<Option<String>> {
        if let Some(excd) = exchange_code::to_us_excd(&ticker.exchange) {
            return Ok(Some(excd.to_string()));
        }
        Ok(self.quote(&ticker.symbol).await?.map(|q| q.exchange))
    }

    async fn fetch_us(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> SourceResult<Vec<KisRawCandle>> {
        let Some(excd) = self.resolve_excd(ticker).await? else {
            warn!(symbol = %ticker.symbol, exchange = %ticker.exchange, "No US exchange resolved for symbol");
            return Ok(Vec::new());
        };

        let rows = match interval {
            CandleInterval::Hour1 => {
                let count = hourly_row_budget(range);
                self.us.get_hourly_candles(&ticker.symbol, &excd, count).await?
            }
            CandleInterval::Daily => {
                let mut rows = self
                    .us
                    .get_daily_history(&ticker.symbol, &excd, daily_row_budget(range))
                    .await?;
                if !matches!(range, FetchRange::Recent(_)) {
                    let (start, _) = range.to_dates();
                    rows.retain(|row| {
                        non_empty(&row.xymd)
                            .and_then(|d| parse_yyyymmdd(d).ok())
                            .map(|d| d >= start)
                            .unwrap_or(true)
                    });
                }
                rows
            }
        };

        Ok(rows.into_iter().map(KisRawCandle::Us).collect())
    }

    async fn fetch_kr(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> SourceResult<Vec<KisRawCandle>> {
        let rows = match interval {
            CandleInterval::Hour1 => self.kr.get_hourly_candles(&ticker.symbol).await?,
            CandleInterval::Daily => {
                let mut rows = self.kr.get_daily_candles(&ticker.symbol).await?;
                if let FetchRange::Recent(count) = range {
                    rows.truncate(*count as usize);
                } else {
                    retain_since(&mut rows, range.to_dates().0);
                }
                rows
            }
        };
        Ok(rows.into_iter().map(KisRawCandle::Kr).collect())
    }
}

#[async_trait]
impl SourceAdapter for KisAdapter {
    type Raw = KisRawCandle;

    fn source(&self) -> CandleSource {
        CandleSource::Kis
    }

    async fn fetch_candles(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Vec<KisRawCandle> {
        let result = if ticker.is_domestic() {
            self.fetch_kr(ticker, interval, range).await
        } else {
            self.fetch_us(ticker, interval, range).await
        };

        match result {
            Ok(rows) => {
                if rows.is_empty() {
                    warn!(symbol = %ticker.symbol, interval = %interval, "KIS returned no candles");
                } else {
                    info!(symbol = %ticker.symbol, interval = %interval, rows = rows.len(), "KIS candles fetched");
                }
                rows
            }
            Err(e) => {
                warn!(symbol = %ticker.symbol, interval = %interval, error = %e, "KIS candle fetch failed");
                Vec::new()
            }
        }
    }
}

/// 60분봉 요청 건수 (최대 [`MAX_MINUTE_ROWS`]).
fn hourly_row_budget(range: &FetchRange) -> u32 {
    let rows = match range {
        FetchRange::Recent(count) => i64::from(*count),
        other => other.calendar_days().max(1) * HOURLY_BARS_PER_DAY,
    };
    rows.clamp(1, i64::from(MAX_MINUTE_ROWS)) as u32
}

/// 일봉 요청 건수. 달력 일수를 거래일 수로 환산하고 여유분을 더합니다.
fn daily_row_budget(range: &FetchRange) -> usize {
    match range {
        FetchRange::Recent(count) => *count as usize,
        other => (other.calendar_days().max(1) * 5 / 7 + 5) as usize,
    }
}
