//! KIS 국내 주식 시세 조회 클라이언트.

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use stock_core::{Candle, CandleInterval, CandleSource};

use super::auth::KisOAuth;
use super::{get_json, tr_id};
use crate::error::SourceResult;
use crate::normalize::{
    daily_anchor, local_to_utc, non_empty, parse_decimal, parse_volume, parse_yyyymmdd, NormalizeError,
    RawCandle,
};

/// 국내주식 캔들 원시 행.
///
/// 분봉 응답은 `stck_prpr`/`cntg_vol`, 일자별 시세 응답은 `stck_clpr`/`acml_vol`을
/// 사용합니다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KrCandleRow {
    /// 영업일자 (YYYYMMDD)
    #[serde(default)]
    pub stck_bsop_date: Option<String>,
    /// 체결시간 (HHMMSS)
    #[serde(default)]
    pub stck_cntg_hour: Option<String>,
    #[serde(default)]
    pub stck_oprc: Option<String>,
    #[serde(default)]
    pub stck_hgpr: Option<String>,
    #[serde(default)]
    pub stck_lwpr: Option<String>,
    /// 현재가 (분봉 종가)
    #[serde(default)]
    pub stck_prpr: Option<String>,
    /// 종가 (일봉)
    #[serde(default)]
    pub stck_clpr: Option<String>,
    /// 체결 거래량 (분봉)
    #[serde(default)]
    pub cntg_vol: Option<String>,
    /// 누적 거래량 (일봉)
    #[serde(default)]
    pub acml_vol: Option<String>,
}

impl RawCandle for KrCandleRow {
    fn to_candle(&self, symbol: &str, interval: CandleInterval) -> Result<Candle, NormalizeError> {
        let date = non_empty(&self.stck_bsop_date).ok_or(NormalizeError::MissingField("stck_bsop_date"))?;
        let candle_time = match interval {
            CandleInterval::Daily => daily_anchor(parse_yyyymmdd(date)?),
            CandleInterval::Hour1 => {
                let time = non_empty(&self.stck_cntg_hour).unwrap_or("000000");
                local_to_utc(chrono_tz::Asia::Seoul, date, time)?
            }
        };

        Ok(Candle {
            symbol: symbol.to_string(),
            interval,
            candle_time,
            open: parse_decimal("stck_oprc", non_empty(&self.stck_oprc))?,
            high: parse_decimal("stck_hgpr", non_empty(&self.stck_hgpr))?,
            low: parse_decimal("stck_lwpr", non_empty(&self.stck_lwpr))?,
            close: parse_decimal(
                "stck_prpr",
                non_empty(&self.stck_prpr).or(non_empty(&self.stck_clpr)),
            )?,
            volume: parse_volume(non_empty(&self.cntg_vol).or(non_empty(&self.acml_vol))),
            source: CandleSource::Kis,
        })
    }
}

/// KIS 국내 주식 클라이언트.
pub struct KisKrClient {
    oauth: Arc<KisOAuth>,
}

impl KisKrClient {
    pub fn new(oauth: Arc<KisOAuth>) -> Self {
        Self { oauth }
    }

    /// 국내주식 당일 시간봉 조회.
    pub async fn get_hourly_candles(&self, code: &str) -> SourceResult<Vec<KrCandleRow>> {
        debug!(code, "Requesting KR hourly candles");
        let resp = get_json::<serde_json::Value, Vec<KrCandleRow>>(
            &self.oauth,
            "/uapi/domestic-stock/v1/quotations/inquire-time-itemchartprice",
            tr_id::KR_MINUTE_CHART,
            &[
                ("fid_cond_mrkt_div_code", "J"),
                ("fid_input_iscd", code),
                ("fid_input_hour_8", "1"),
                ("fid_pw_data_incu_yn", "N"),
                ("fid_uplc_diff_yn", "N"),
                ("fid_period_div_code", "H"),
            ],
        )
        .await?;

        Ok(resp.output2.unwrap_or_default())
    }

    /// 국내주식 일자별 시세 조회 (최근 30영업일).
    pub async fn get_daily_candles(&self, code: &str) -> SourceResult<Vec<KrCandleRow>> {
        debug!(code, "Requesting KR daily candles");
        let resp = get_json::<Vec<KrCandleRow>, serde_json::Value>(
            &self.oauth,
            "/uapi/domestic-stock/v1/quotations/inquire-daily-price",
            tr_id::KR_DAILY_PRICE,
            &[
                ("fid_cond_mrkt_div_code", "J"),
                ("fid_input_iscd", code),
                ("fid_period_div_code", "D"),
                // 수정주가 반영
                ("fid_org_adj_prc", "0"),
            ],
        )
        .await?;

        Ok(resp.output.unwrap_or_default())
    }
}

/// `since` 이전 거래일의 행을 제외합니다.
pub(crate) fn retain_since(rows: &mut Vec<KrCandleRow>, since: NaiveDate) {
    rows.retain(|row| {
        non_empty(&row.stck_bsop_date)
            .and_then(|d| parse_yyyymmdd(d).ok())
            .map(|d| d >= since)
            .unwrap_or(true)
    });
}
