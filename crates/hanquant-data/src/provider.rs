//! HTTP 시세 제공자.
//!
//! 외부 시세 API에서 최신가를 조회합니다. 모든 호출은 프로세스 전역
//! 토큰 버킷(기본 1 rps)으로 제한되고, 일시적 실패는 지수 백오프로
//! 재시도합니다(3회, 기본 1초, 배수 2, 지터 ±20%). 재시도가 소진되면
//! 호출자가 해당 종목을 건너뜁니다.

use crate::error::{DataError, Result};
use crate::price::PriceSource;
use crate::rate_limit::TokenBucket;
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use hanquant_core::{Price, QuantError, Ticker};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// 시세 API 응답.
#[derive(Debug, Clone, Deserialize)]
struct QuoteResponse {
    /// 최신가
    price: Price,
}

/// HTTP 시세 제공자.
pub struct HttpPriceProvider {
    client: Client,
    base_url: String,
    limiter: TokenBucket,
    retry: RetryPolicy,
}

impl HttpPriceProvider {
    /// 새 제공자를 생성합니다.
    ///
    /// # 인자
    /// * `base_url` - 시세 API 기본 URL
    /// * `rps` - 초당 요청 한도
    pub fn new(base_url: impl Into<String>, rps: f64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DataError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: TokenBucket::per_second(rps),
            retry: RetryPolicy::default(),
        })
    }

    fn quote_url(&self, ticker: &Ticker) -> String {
        format!("{}/quote/{}", self.base_url, ticker)
    }

    async fn fetch_quote(&self, ticker: &Ticker) -> std::result::Result<Option<Price>, QuantError> {
        let url = self.quote_url(ticker);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QuantError::Transient(format!("quote request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if status.is_server_error() {
            return Err(QuantError::Transient(format!(
                "quote provider returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(QuantError::Validation(format!(
                "quote provider rejected request: {}",
                status
            )));
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| QuantError::Serialization(e.to_string()))?;
        debug!(ticker = %ticker, price = %quote.price, "quote fetched");
        Ok(Some(quote.price))
    }
}

#[async_trait]
impl PriceSource for HttpPriceProvider {
    async fn latest_price(&self, ticker: &Ticker) -> Result<Option<Price>> {
        self.limiter.acquire().await;

        retry_with_backoff(&self.retry, "fetch_quote", || self.fetch_quote(ticker))
            .await
            .map_err(|e| DataError::Provider(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_url_format() {
        let provider = HttpPriceProvider::new("http://localhost:8000/", 1.0).unwrap();
        let ticker = Ticker::new("005930").unwrap();
        assert_eq!(
            provider.quote_url(&ticker),
            "http://localhost:8000/quote/005930"
        );
    }
}
