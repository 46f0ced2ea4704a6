//! 종목 마스터 레코드.

use crate::types::{Market, Ticker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 종목 마스터.
///
/// 유니버스 탐색 시 1회 생성되고 주간 갱신으로만 수정되는 불변 레코드입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stock {
    /// 종목코드 (기본 키)
    pub ticker: Ticker,
    /// 한글 종목명
    pub name: String,
    /// 영문 종목명
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    /// 시장 구분
    pub market: Market,
    /// 섹터
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    /// 업종
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// 상장 주식 수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listed_shares: Option<i64>,
    /// 거래 가능 여부
    pub is_active: bool,
    /// 생성 타임스탬프
    pub created_at: DateTime<Utc>,
    /// 마지막 갱신 타임스탬프
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// 새 종목 마스터를 생성합니다.
    pub fn new(ticker: Ticker, name: impl Into<String>, market: Market) -> Self {
        let now = Utc::now();
        Self {
            ticker,
            name: name.into(),
            name_en: None,
            market,
            sector: None,
            industry: None,
            listed_shares: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// 섹터를 설정합니다.
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// 업종을 설정합니다.
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_builder() {
        let ticker = Ticker::new("005930").unwrap();
        let stock = Stock::new(ticker, "삼성전자", Market::Kospi).with_sector("전기전자");

        assert_eq!(stock.market, Market::Kospi);
        assert_eq!(stock.sector.as_deref(), Some("전기전자"));
        assert!(stock.is_active);
    }
}
