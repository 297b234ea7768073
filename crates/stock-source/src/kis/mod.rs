//! 한국투자증권 (KIS) 시세 조회 모듈.
//!
//! - OAuth 2.0 접근 토큰 발급 및 캐시 (`auth`)
//! - 해외 주식 60분봉/일봉/현재가 (`client_us`)
//! - 국내 주식 시간봉/일봉 (`client_kr`)
//! - 스케줄러용 [`KisAdapter`] (`adapter`)
//!
//! 공식 API 문서: <https://apiportal.koreainvestment.com/>

pub mod adapter;
pub mod auth;
pub mod client_kr;
pub mod client_us;
pub mod config;

pub use adapter::{KisAdapter, KisRawCandle};
pub use auth::{ensure_valid_token, AccessToken, KisOAuth, TokenCache, TokenDecision};
pub use client_kr::{KisKrClient, KrCandleRow};
pub use client_us::{KisUsClient, UsCandleRow, UsQuote};
pub use config::KisConfig;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::error;

use crate::error::{SourceError, SourceResult};

/// KIS 거래 ID (tr_id) 상수.
pub mod tr_id {
    /// 해외주식 분봉 조회
    pub const US_MINUTE_CHART: &str = "HHDFS76950200";
    /// 해외주식 기간별 시세 (일봉)
    pub const US_DAILY_PRICE: &str = "HHDFS76240000";
    /// 해외주식 현재체결가
    pub const US_PRICE: &str = "HHDFS00000300";
    /// 국내주식 당일 분봉 조회
    pub const KR_MINUTE_CHART: &str = "FHKST03010200";
    /// 국내주식 일자별 시세
    pub const KR_DAILY_PRICE: &str = "FHKST01010400";
}

/// KIS 해외 거래소 코드 (EXCD).
pub mod exchange_code {
    /// NASDAQ
    pub const NASDAQ: &str = "NAS";
    /// 뉴욕증권거래소
    pub const NYSE: &str = "NYS";
    /// 미국증권거래소
    pub const AMEX: &str = "AMS";

    /// 현재가 조회 시 시도하는 순서.
    pub const US_FALLBACK_ORDER: [&str; 3] = [NASDAQ, NYSE, AMEX];

    /// 등록된 거래소 코드를 KIS EXCD로 변환합니다. 미국 거래소가 아니면 None.
    pub fn to_us_excd(exchange: &str) -> Option<&'static str> {
        match exchange.trim().to_uppercase().as_str() {
            "NAS" | "NASD" | "NASDAQ" => Some(NASDAQ),
            "NYS" | "NYSE" => Some(NYSE),
            "AMS" | "AMEX" => Some(AMEX),
            _ => None,
        }
    }
}

/// KIS 공통 응답 형식.
///
/// `output`은 단건(현재가), `output2`는 목록(캔들)에 사용됩니다.
#[derive(Debug, Deserialize)]
pub struct KisResponse<O = serde_json::Value, O2 = serde_json::Value> {
    /// 응답 코드 ("0" = 성공)
    #[serde(default)]
    pub rt_cd: String,
    #[serde(default)]
    pub msg_cd: String,
    #[serde(default)]
    pub msg1: String,
    pub output: Option<O>,
    pub output2: Option<O2>,
}

impl<O, O2> KisResponse<O, O2> {
    pub fn is_success(&self) -> bool {
        self.rt_cd == "0"
    }

    fn into_result(self) -> SourceResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SourceError::Api {
                code: self.msg_cd,
                message: self.msg1,
            })
        }
    }
}

/// 인증 헤더를 붙여 GET 요청을 보내고 KIS 응답을 파싱합니다.
///
/// 2xx 이외의 상태 코드와 `rt_cd != "0"`은 에러입니다. 401 응답이면 토큰을 버려
/// 다음 요청에서 재발급합니다.
pub(crate) async fn get_json<O, O2>(
    oauth: &KisOAuth,
    path: &str,
    tr_id: &str,
    query: &[(&str, &str)],
) -> SourceResult<KisResponse<O, O2>>
where
    O: DeserializeOwned,
    O2: DeserializeOwned,
{
    let url = format!("{}{}", oauth.config().base_url, path);
    let headers = oauth.build_headers(tr_id).await?;

    let response = oauth
        .client()
        .get(&url)
        .headers(headers)
        .query(query)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        error!(path, tr_id, status = status.as_u16(), body = %body, "KIS request failed");
        if status.as_u16() == 401 {
            oauth.invalidate().await;
        }
        return Err(SourceError::Http {
            status: status.as_u16(),
            body,
        });
    }

    let parsed: KisResponse<O, O2> = serde_json::from_str(&body).map_err(|e| {
        SourceError::Parse(format!("{} 응답 파싱 실패: {} (body: {})", tr_id, e, body))
    })?;
    parsed.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_us_excd_mapping() {
        assert_eq!(exchange_code::to_us_excd("nas"), Some("NAS"));
        assert_eq!(exchange_code::to_us_excd("NYSE"), Some("NYS"));
        assert_eq!(exchange_code::to_us_excd("AMEX"), Some("AMS"));
        assert_eq!(exchange_code::to_us_excd("KRX"), None);
    }

    #[test]
    fn test_response_envelope_error() {
        let resp: KisResponse = serde_json::from_str(
            r#"{"rt_cd":"1","msg_cd":"EGW00201","msg1":"초당 거래건수를 초과하였습니다."}"#,
        )
        .unwrap();
        assert!(!resp.is_success());
        assert!(matches!(resp.into_result(), Err(SourceError::Api { .. })));
    }
}
