//! 관리 종목(Ticker Registry 항목) 타입.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 거래소 코드가 지정되지 않았을 때 사용하는 기본값 (NASDAQ).
pub const DEFAULT_EXCHANGE: &str = "NAS";

/// 국내 시장을 나타내는 거래소 코드.
const DOMESTIC_EXCHANGES: &[&str] = &["KRX", "KOSPI", "KOSDAQ", "KR"];

/// 수집 대상으로 등록된 종목.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedTicker {
    pub id: i32,
    /// 종목 심볼 (대문자, 고유)
    pub symbol: String,
    /// 거래소 코드 (대문자, 예: NAS, NYS, AMS, KRX)
    pub exchange: String,
    pub name: Option<String>,
    /// 비활성 종목은 스케줄러가 수집하지 않습니다
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// 마지막으로 1개 이상의 캔들이 저장된 시각
    pub last_collected_at: Option<DateTime<Utc>>,
}

impl ManagedTicker {
    /// 등록되지 않은 심볼로 일회성 조회에 쓰는 종목 값을 만듭니다.
    ///
    /// `id`는 0이며 저장소에 존재하지 않습니다.
    pub fn unregistered(symbol: &str, exchange: &str) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            symbol: normalize_symbol(symbol),
            exchange: normalize_exchange(exchange),
            name: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_collected_at: None,
        }
    }

    /// 저장소에 등록된 종목인지 여부.
    pub fn is_registered(&self) -> bool {
        self.id > 0
    }

    /// 국내(KRX) 종목 여부.
    ///
    /// 거래소 코드가 국내 시장이거나 심볼이 6자리 숫자 코드이면 국내 종목입니다.
    pub fn is_domestic(&self) -> bool {
        is_domestic_market(&self.exchange, &self.symbol)
    }
}

/// 심볼을 저장 형식(앞뒤 공백 제거, 대문자)으로 정규화합니다.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// 거래소 코드를 정규화합니다. 비어 있으면 [`DEFAULT_EXCHANGE`]를 사용합니다.
pub fn normalize_exchange(exchange: &str) -> String {
    let exchange = exchange.trim().to_uppercase();
    if exchange.is_empty() {
        DEFAULT_EXCHANGE.to_string()
    } else {
        exchange
    }
}

/// 거래소 코드와 심볼로 국내 종목 여부를 판별합니다.
pub fn is_domestic_market(exchange: &str, symbol: &str) -> bool {
    let exchange = exchange.trim().to_uppercase();
    if DOMESTIC_EXCHANGES.contains(&exchange.as_str()) {
        return true;
    }
    let symbol = symbol.trim();
    symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(symbol: &str, exchange: &str) -> ManagedTicker {
        let now = Utc::now();
        ManagedTicker {
            id: 1,
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            name: None,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_collected_at: None,
        }
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl "), "AAPL");
        assert_eq!(normalize_symbol("brk.b"), "BRK.B");
    }

    #[test]
    fn test_unregistered_ticker() {
        let t = ManagedTicker::unregistered(" msft ", "");
        assert_eq!(t.symbol, "MSFT");
        assert_eq!(t.exchange, "NAS");
        assert!(!t.is_registered());
        assert!(ticker("AAPL", "NAS").is_registered());
    }

    #[test]
    fn test_normalize_exchange_default() {
        assert_eq!(normalize_exchange(""), "NAS");
        assert_eq!(normalize_exchange("nys"), "NYS");
    }

    #[test]
    fn test_domestic_detection() {
        assert!(ticker("005930", "NAS").is_domestic());
        assert!(ticker("SAMSUNG", "krx").is_domestic());
        assert!(!ticker("AAPL", "NAS").is_domestic());
        assert!(!ticker("12345", "NYS").is_domestic());
    }
}
