//! 최신가 조회 인터페이스.

use crate::error::Result;
use async_trait::async_trait;
use hanquant_core::{Price, Ticker};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// 최신가 조회 인터페이스.
///
/// 구현체는 Redis 캐시, 브로커 API, 인메모리 테이블 등 무엇이든 될 수
/// 있습니다. 시스템 오브 레코드가 아니라 조회 전용입니다.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// 종목의 최신가를 반환합니다. 가격이 없으면 None.
    async fn latest_price(&self, ticker: &Ticker) -> Result<Option<Price>>;
}

/// 인메모리 가격 소스 (페이퍼 트레이딩/테스트용).
#[derive(Default)]
pub struct StaticPriceSource {
    prices: RwLock<HashMap<Ticker, Price>>,
}

impl StaticPriceSource {
    /// 빈 가격 소스를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 가격을 설정합니다.
    pub async fn set_price(&self, ticker: Ticker, price: Price) {
        let mut prices = self.prices.write().await;
        prices.insert(ticker, price);
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn latest_price(&self, ticker: &Ticker) -> Result<Option<Price>> {
        let prices = self.prices.read().await;
        Ok(prices.get(ticker).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_static_price_source() {
        let source = StaticPriceSource::new();
        let ticker = Ticker::new("005930").unwrap();
        source.set_price(ticker.clone(), dec!(70000)).await;

        assert_eq!(source.latest_price(&ticker).await.unwrap(), Some(dec!(70000)));
        assert_eq!(
            source
                .latest_price(&Ticker::new("000660").unwrap())
                .await
                .unwrap(),
            None
        );
    }
}
