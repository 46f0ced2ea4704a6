//! 종목코드 및 시장 유형 정의.
//!
//! 이 모듈은 한국 주식 종목 관련 타입을 정의합니다:
//! - `Market` - 시장 구분 (KOSPI, KOSDAQ, KONEX)
//! - `Ticker` - 6자리 제로패딩 종목코드

use crate::error::{QuantError, QuantResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 한국 주식 시장 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    /// 유가증권시장
    Kospi,
    /// 코스닥시장
    Kosdaq,
    /// 코넥스시장
    Konex,
}

impl Market {
    /// 시장 코드 문자열에서 Market을 생성합니다.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "KOSPI" | "STK" => Some(Market::Kospi),
            "KOSDAQ" | "KSQ" => Some(Market::Kosdaq),
            "KONEX" | "KNX" => Some(Market::Konex),
            _ => None,
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Market::Kospi => write!(f, "KOSPI"),
            Market::Kosdaq => write!(f, "KOSDAQ"),
            Market::Konex => write!(f, "KONEX"),
        }
    }
}

/// 6자리 제로패딩 종목코드.
///
/// 종목코드는 항상 문자열로 다룹니다. 정수로 변환하면 선행 0이
/// 소실되므로 (예: "005930") 절대 정수로 저장하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticker(String);

impl Ticker {
    /// 종목코드를 검증 후 생성합니다.
    ///
    /// 6자리 미만 숫자 문자열은 제로패딩됩니다 (예: "5930" -> "005930").
    pub fn new(code: impl AsRef<str>) -> QuantResult<Self> {
        let code = code.as_ref().trim();

        if code.is_empty() || code.len() > 6 {
            return Err(QuantError::Validation(format!(
                "invalid ticker: {:?} (must be 1-6 digits)",
                code
            )));
        }
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QuantError::Validation(format!(
                "invalid ticker: {:?} (non-digit character)",
                code
            )));
        }

        Ok(Self(format!("{:0>6}", code)))
    }

    /// 종목코드 문자열을 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_zero_padding() {
        let ticker = Ticker::new("5930").unwrap();
        assert_eq!(ticker.as_str(), "005930");
    }

    #[test]
    fn test_ticker_full_code() {
        let ticker = Ticker::new("005930").unwrap();
        assert_eq!(ticker.to_string(), "005930");
    }

    #[test]
    fn test_ticker_rejects_non_digit() {
        assert!(Ticker::new("AAPL").is_err());
        assert!(Ticker::new("00593A").is_err());
        assert!(Ticker::new("").is_err());
        assert!(Ticker::new("1234567").is_err());
    }

    #[test]
    fn test_ticker_serde_is_transparent() {
        let ticker = Ticker::new("000660").unwrap();
        let json = serde_json::to_string(&ticker).unwrap();
        assert_eq!(json, "\"000660\"");

        let parsed: Ticker = serde_json::from_str("\"035720\"").unwrap();
        assert_eq!(parsed.as_str(), "035720");
    }

    #[test]
    fn test_market_from_code() {
        assert_eq!(Market::from_code("kospi"), Some(Market::Kospi));
        assert_eq!(Market::from_code("KSQ"), Some(Market::Kosdaq));
        assert_eq!(Market::from_code("KNX"), Some(Market::Konex));
        assert_eq!(Market::from_code("NYSE"), None);
    }
}
