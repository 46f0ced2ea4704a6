//! 종목 마스터 조회.

use crate::error::Result;
use async_trait::async_trait;
use hanquant_core::{Stock, Ticker};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// 종목 마스터 조회 인터페이스.
///
/// 시그널 검증기가 섹터 집중도 계산에 사용합니다.
#[async_trait]
pub trait StockDirectory: Send + Sync {
    /// 종목 마스터를 조회합니다.
    async fn get(&self, ticker: &Ticker) -> Result<Option<Stock>>;
}

/// 인메모리 종목 마스터 (페이퍼 트레이딩/테스트용).
#[derive(Default)]
pub struct StaticStockDirectory {
    stocks: RwLock<HashMap<Ticker, Stock>>,
}

impl StaticStockDirectory {
    /// 빈 디렉토리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 종목을 등록합니다.
    pub async fn insert(&self, stock: Stock) {
        let mut stocks = self.stocks.write().await;
        stocks.insert(stock.ticker.clone(), stock);
    }
}

#[async_trait]
impl StockDirectory for StaticStockDirectory {
    async fn get(&self, ticker: &Ticker) -> Result<Option<Stock>> {
        let stocks = self.stocks.read().await;
        Ok(stocks.get(ticker).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanquant_core::Market;

    #[tokio::test]
    async fn test_static_directory() {
        let directory = StaticStockDirectory::new();
        let ticker = Ticker::new("005930").unwrap();
        directory
            .insert(Stock::new(ticker.clone(), "삼성전자", Market::Kospi).with_sector("전기전자"))
            .await;

        let stock = directory.get(&ticker).await.unwrap().unwrap();
        assert_eq!(stock.sector.as_deref(), Some("전기전자"));
    }
}
