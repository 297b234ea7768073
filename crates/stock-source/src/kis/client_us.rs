//! KIS 해외 주식 시세 조회 클라이언트.
//!
//! # 거래소 코드 (EXCD)
//!
//! - `NAS`: NASDAQ
//! - `NYS`: 뉴욕증권거래소
//! - `AMS`: 미국증권거래소

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use stock_core::{Candle, CandleInterval, CandleSource};

use super::auth::KisOAuth;
use super::{exchange_code, get_json, tr_id};
use crate::error::SourceResult;
use crate::normalize::{
    daily_anchor, local_to_utc, non_empty, parse_decimal, parse_volume, parse_yyyymmdd, NormalizeError,
    RawCandle,
};

/// 60분봉 한 번에 요청할 최대 건수.
pub const MAX_MINUTE_ROWS: u32 = 120;

/// 일봉 페이지네이션 최대 반복 횟수.
pub const MAX_DAILY_PAGES: usize = 10;

/// 해외주식 캔들 원시 행 (분봉/일봉 공통).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsCandleRow {
    /// 거래일 (YYYYMMDD, 현지)
    #[serde(default)]
    pub xymd: Option<String>,
    /// 체결 시각 (HHMMSS, 현지). 일봉에는 없음
    #[serde(default)]
    pub xhms: Option<String>,
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub high: Option<String>,
    #[serde(default)]
    pub low: Option<String>,
    /// 종가 (일봉)
    #[serde(default)]
    pub clos: Option<String>,
    /// 현재가 (분봉에서 종가 대신 사용)
    #[serde(default)]
    pub last: Option<String>,
    /// 거래량 (일봉)
    #[serde(default)]
    pub tvol: Option<String>,
    /// 체결량 (분봉)
    #[serde(default)]
    pub evol: Option<String>,
}

impl RawCandle for UsCandleRow {
    fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError> {
        let date = non_empty(&self.xymd).ok_or(NormalizeError::MissingField("xymd"))?;
        let candle_time: DateTime<Utc> = match interval {
            CandleInterval::Daily => daily_anchor(parse_yyyymmdd(date)?),
            CandleInterval::Hour1 => {
                let time = non_empty(&self.xhms).unwrap_or("000000");
                local_to_utc(chrono_tz::America::New_York, date, time)?
            }
        };

        Ok(Candle {
            symbol: symbol.to_string(),
            interval,
            candle_time,
            open: parse_decimal("open", non_empty(&self.open))?,
            high: parse_decimal("high", non_empty(&self.high))?,
            low: parse_decimal("low", non_empty(&self.low))?,
            close: parse_decimal("clos", non_empty(&self.clos).or(non_empty(&self.last)))?,
            volume: parse_volume(non_empty(&self.tvol).or(non_empty(&self.evol))),
            source: CandleSource::Kis,
        })
    }
}

/// 현재가 응답 output.
#[derive(Debug, Default, Deserialize)]
struct UsPriceOutput {
    #[serde(default)]
    last: Option<String>,
    #[serde(default)]
    diff: Option<String>,
    #[serde(default)]
    rate: Option<String>,
}

/// 해외주식 현재가.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsQuote {
    pub symbol: String,
    pub price: Decimal,
    /// 전일 대비
    pub diff: Option<Decimal>,
    /// 등락률 (%)
    pub rate: Option<Decimal>,
    /// 조회에 성공한 거래소 코드
    pub exchange: String,
}

/// KIS 해외 주식 클라이언트.
///
/// 국내 클라이언트와 `KisOAuth`를 공유합니다.
pub struct KisUsClient {
    oauth: Arc<KisOAuth>,
}

impl KisUsClient {
    pub fn new(oauth: Arc<KisOAuth>) -> Self {
        Self { oauth }
    }

    /// 해외주식 60분봉 조회 (최신순).
    pub async fn get_hourly_candles(
        &self,
        symbol: &str,
        excd: &str,
        count: u32,
    ) -> SourceResult<Vec<UsCandleRow>> {
        let symbol = symbol.to_uppercase();
        let nrec = count.clamp(1, MAX_MINUTE_ROWS).to_string();
        debug!(symbol = %symbol, excd, nrec = %nrec, "Requesting US 60m candles");

        let resp = get_json::<serde_json::Value, Vec<UsCandleRow>>(
            &self.oauth,
            "/uapi/overseas-price/v1/quotations/inquire-time-itemchartprice",
            tr_id::US_MINUTE_CHART,
            &[
                ("AUTH", ""),
                ("EXCD", excd),
                ("SYMB", &symbol),
                ("NMIN", "60"),
                ("PINC", "1"),
                ("NEXT", ""),
                ("NREC", &nrec),
                ("FILL", ""),
                ("KEYB", ""),
            ],
        )
        .await?;

        Ok(resp.output2.unwrap_or_default())
    }

    /// 해외주식 일봉 한 페이지 조회. `bymd`가 비어 있으면 최신일부터입니다.
    pub async fn get_daily_page(
        &self,
        symbol: &str,
        excd: &str,
        bymd: &str,
    ) -> SourceResult<Vec<UsCandleRow>> {
        let symbol = symbol.to_uppercase();
        let resp = get_json::<serde_json::Value, Vec<UsCandleRow>>(
            &self.oauth,
            "/uapi/overseas-price/v1/quotations/dailyprice",
            tr_id::US_DAILY_PRICE,
            &[
                ("AUTH", ""),
                ("EXCD", excd),
                ("SYMB", &symbol),
                // 0: 일봉
                ("GUBN", "0"),
                ("BYMD", bymd),
                // 수정주가 반영
                ("MODP", "1"),
            ],
        )
        .await?;

        Ok(resp.output2.unwrap_or_default())
    }

    /// 최근 `max_rows`개 일봉을 조회합니다.
    ///
    /// 한 페이지로 부족하면 마지막 행의 `xymd`를 다음 `BYMD`로 사용해 최대
    /// [`MAX_DAILY_PAGES`]회까지 이어서 조회합니다. 빈 페이지를 받거나 커서가
    /// 바뀌지 않으면 중단합니다.
    pub async fn get_daily_history(
        &self,
        symbol: &str,
        excd: &str,
        max_rows: usize,
    ) -> SourceResult<Vec<UsCandleRow>> {
        let mut rows: Vec<UsCandleRow> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = String::new();

        for page in 0..MAX_DAILY_PAGES {
            let batch = self.get_daily_page(symbol, excd, &cursor).await?;
            if batch.is_empty() {
                debug!(symbol, page, "Empty daily page, stopping pagination");
                break;
            }

            let next_cursor = batch
                .last()
                .and_then(|row| non_empty(&row.xymd))
                .map(str::to_string);

            for row in batch {
                let key = non_empty(&row.xymd).map(str::to_string);
                if let Some(key) = key {
                    if !seen.insert(key) {
                        continue;
                    }
                }
                rows.push(row);
            }

            if rows.len() >= max_rows {
                break;
            }

            match next_cursor {
                Some(next) if next != cursor => cursor = next,
                _ => break,
            }
        }

        rows.truncate(max_rows);
        info!(symbol, excd, rows = rows.len(), "US daily history fetched");
        Ok(rows)
    }

    /// 현재가 조회. `NAS → NYS → AMS` 순서로 시도해 처음 성공한 거래소를 반환합니다.
    ///
    /// `rt_cd == "0"`이고 `last`가 비어 있지 않은 응답만 성공으로 봅니다. 빈 `last`는
    /// 다른 거래소 종목으로 간주하므로 거래정지 등으로 가격이 비어 있는 종목도
    /// 다음 거래소로 넘어갑니다.
    pub async fn get_quote(&self, symbol: &str) -> SourceResult<Option<UsQuote>> {
        let symbol = symbol.to_uppercase();

        for excd in exchange_code::US_FALLBACK_ORDER {
            let resp = get_json::<UsPriceOutput, serde_json::Value>(
                &self.oauth,
                "/uapi/overseas-price/v1/quotations/price",
                tr_id::US_PRICE,
                &[("AUTH", ""), ("EXCD", excd), ("SYMB", &symbol)],
            )
            .await;

            let output = match resp {
                Ok(resp) => resp.output.unwrap_or_default(),
                Err(e) => {
                    if e.is_auth_error() {
                        return Err(e);
                    }
                    warn!(symbol = %symbol, excd, error = %e, "US price lookup failed, trying next exchange");
                    continue;
                }
            };

            let Some(last) = non_empty(&output.last) else {
                debug!(symbol = %symbol, excd, "Empty last price, trying next exchange");
                continue;
            };

            let price = match Decimal::from_str(last) {
                Ok(price) => price,
                Err(_) => {
                    warn!(symbol = %symbol, excd, last, "Unparseable last price");
                    continue;
                }
            };

            info!(symbol = %symbol, excd, price = %price, "US quote resolved");
            return Ok(Some(UsQuote {
                symbol,
                price,
                diff: non_empty(&output.diff).and_then(|s| Decimal::from_str(s).ok()),
                rate: non_empty(&output.rate).and_then(|s| Decimal::from_str(s).ok()),
                exchange: excd.to_string(),
            }));
        }

        warn!(symbol = %symbol, "Symbol not found on NAS/NYS/AMS");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kis::KisConfig;
    use rust_decimal_macros::dec;

    fn row(xymd: &str, xhms: Option<&str>) -> UsCandleRow {
        UsCandleRow {
            xymd: Some(xymd.to_string()),
            xhms: xhms.map(str::to_string),
            open: Some("187.1500".into()),
            high: Some("188.4400".into()),
            low: Some("186.9000".into()),
            clos: Some("188.0100".into()),
            last: None,
            tvol: Some("53412345".into()),
            evol: None,
        }
    }

    #[test]
    fn test_daily_row_anchored_to_utc_midnight() {
        let candle = row("20240315", None).to_candle("AAPL", CandleInterval::Daily).unwrap();
        assert_eq!(candle.candle_time.to_rfc3339(), "2024-03-15T00:00:00+00:00");
        assert_eq!(candle.close, dec!(188.01));
        assert_eq!(candle.volume, 53_412_345);
        assert_eq!(candle.source, CandleSource::Kis);
    }

    #[test]
    fn test_hourly_row_uses_new_york_time() {
        let candle = row("20240315", Some("103000"))
            .to_candle("AAPL", CandleInterval::Hour1)
            .unwrap();
        // 2024-03-15은 EDT (UTC-4)
        assert_eq!(candle.candle_time.to_rfc3339(), "2024-03-15T14:30:00+00:00");
    }

    #[test]
    fn test_close_and_volume_fallbacks() {
        let mut r = row("20240315", Some("100000"));
        r.clos = None;
        r.last = Some("190.5".into());
        r.tvol = None;
        r.evol = Some("1200".into());
        let candle = r.to_candle("AAPL", CandleInterval::Hour1).unwrap();
        assert_eq!(candle.close, dec!(190.5));
        assert_eq!(candle.volume, 1200);
    }

    #[test]
    fn test_missing_date_fails() {
        let mut r = row("", None);
        r.xymd = None;
        assert_eq!(
            r.to_candle("AAPL", CandleInterval::Daily),
            Err(NormalizeError::MissingField("xymd"))
        );
    }

    async fn client_for(server: &mockito::ServerGuard) -> KisUsClient {
        let oauth = KisOAuth::new(KisConfig::new("app-key", "app-secret").with_base_url(server.url())).unwrap();
        KisUsClient::new(Arc::new(oauth))
    }

    async fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","expires_in":86400,"access_token_token_expired":"2099-12-31 23:59:59"}"#)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_quote_falls_back_to_nyse() {
        use mockito::Matcher;

        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let nas = server
            .mock("GET", "/uapi/overseas-price/v1/quotations/price")
            .match_query(Matcher::UrlEncoded("EXCD".into(), "NAS".into()))
            .match_header("tr_id", "HHDFS00000300")
            .with_status(200)
            .with_body(r#"{"rt_cd":"0","msg_cd":"","msg1":"","output":{"last":"","diff":"","rate":""}}"#)
            .create_async()
            .await;
        let nys = server
            .mock("GET", "/uapi/overseas-price/v1/quotations/price")
            .match_query(Matcher::UrlEncoded("EXCD".into(), "NYS".into()))
            .with_status(200)
            .with_body(r#"{"rt_cd":"0","msg_cd":"","msg1":"","output":{"last":"61.2300","diff":"0.4100","rate":"0.67"}}"#)
            .create_async()
            .await;
        let ams = server
            .mock("GET", "/uapi/overseas-price/v1/quotations/price")
            .match_query(Matcher::UrlEncoded("EXCD".into(), "AMS".into()))
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let quote = client.get_quote("ko").await.unwrap().unwrap();

        assert_eq!(quote.exchange, "NYS");
        assert_eq!(quote.symbol, "KO");
        assert_eq!(quote.price, dec!(61.23));
        assert_eq!(quote.diff, Some(dec!(0.41)));
        nas.assert_async().await;
        nys.assert_async().await;
        ams.assert_async().await;
    }

    #[tokio::test]
    async fn test_quote_none_when_all_exchanges_miss() {
        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        let miss = server
            .mock("GET", "/uapi/overseas-price/v1/quotations/price")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"rt_cd":"0","output":{"last":""}}"#)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server).await;
        assert!(client.get_quote("ZZZZ").await.unwrap().is_none());
        miss.assert_async().await;
    }

    #[tokio::test]
    async fn test_daily_history_paginates_until_repeated_cursor() {
        use mockito::Matcher;

        let mut server = mockito::Server::new_async().await;
        let _token = mock_token(&mut server).await;
        server
            .mock("GET", "/uapi/overseas-price/v1/quotations/dailyprice")
            .match_query(Matcher::UrlEncoded("BYMD".into(), "".into()))
            .with_status(200)
            .with_body(
                r#"{"rt_cd":"0","output2":[
                    {"xymd":"20240315","open":"1","high":"2","low":"0.5","clos":"1.5","tvol":"10"},
                    {"xymd":"20240314","open":"1","high":"2","low":"0.5","clos":"1.5","tvol":"10"}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/uapi/overseas-price/v1/quotations/dailyprice")
            .match_query(Matcher::UrlEncoded("BYMD".into(), "20240314".into()))
            .with_status(200)
            .with_body(
                r#"{"rt_cd":"0","output2":[
                    {"xymd":"20240314","open":"1","high":"2","low":"0.5","clos":"1.5","tvol":"10"},
                    {"xymd":"20240313","open":"1","high":"2","low":"0.5","clos":"1.5","tvol":"10"}
                ]}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/uapi/overseas-price/v1/quotations/dailyprice")
            .match_query(Matcher::UrlEncoded("BYMD".into(), "20240313".into()))
            .with_status(200)
            .with_body(r#"{"rt_cd":"0","output2":[]}"#)
            .create_async()
            .await;

        let client = client_for(&server).await;
        let rows = client.get_daily_history("AAPL", "NAS", 365).await.unwrap();
        let dates: Vec<_> = rows.iter().filter_map(|r| r.xymd.clone()).collect();
        assert_eq!(dates, vec!["20240315", "20240314", "20240313"]);
    }
}
