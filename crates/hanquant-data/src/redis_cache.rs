//! Redis 최신가 캐시 및 가격 이벤트 발행.
//!
//! Redis는 캐시와 알림 버스로만 사용합니다. 시스템 오브 레코드는
//! PostgreSQL이며, 어떤 비즈니스 로직도 Redis 순서에 의존하지 않습니다.
//!
//! # 키/채널 레이아웃
//! - 키 `price:latest:{ticker}` -> JSON, TTL 1시간
//! - 채널 `stock:price:update` / `stock:price:significant_change` /
//!   `stock:price:alert`, 페이로드 `{event_type, ticker, timestamp, data}`

use crate::error::{DataError, Result};
use crate::price::PriceSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hanquant_core::{Price, Ticker};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// 가격 업데이트 채널.
pub const CHANNEL_PRICE_UPDATE: &str = "stock:price:update";
/// 급등락 채널.
pub const CHANNEL_SIGNIFICANT_CHANGE: &str = "stock:price:significant_change";
/// 가격 경보 채널.
pub const CHANNEL_PRICE_ALERT: &str = "stock:price:alert";

/// 캐시되는 최신가 엔트리.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPrice {
    /// 종목코드
    pub ticker: Ticker,
    /// 최신가
    pub price: Price,
    /// 기준 타임스탬프
    pub as_of: DateTime<Utc>,
}

/// pub/sub으로 발행되는 가격 이벤트.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEvent {
    /// 이벤트 유형
    pub event_type: String,
    /// 종목코드
    pub ticker: Ticker,
    /// 발행 타임스탬프
    pub timestamp: DateTime<Utc>,
    /// 이벤트 데이터
    pub data: serde_json::Value,
}

impl PriceEvent {
    /// 가격 업데이트 이벤트를 생성합니다.
    pub fn price_update(ticker: Ticker, price: Price) -> Self {
        Self {
            event_type: "price_update".to_string(),
            ticker,
            timestamp: Utc::now(),
            data: serde_json::json!({ "price": price }),
        }
    }
}

/// Redis 최신가 캐시.
#[derive(Clone)]
pub struct RedisPriceCache {
    connection: Arc<RwLock<MultiplexedConnection>>,
    ttl_secs: u64,
}

impl RedisPriceCache {
    /// Redis에 연결합니다.
    pub async fn connect(url: &str, ttl_secs: u64) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!("Redis price cache connected");

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            ttl_secs,
        })
    }

    /// 연결 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection.write().await;
        let pong: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(pong == "PONG")
    }

    fn price_key(ticker: &Ticker) -> String {
        format!("price:latest:{}", ticker)
    }

    /// 최신가를 저장하고 업데이트 이벤트를 발행합니다.
    pub async fn set_latest_price(&self, ticker: &Ticker, price: Price) -> Result<()> {
        let entry = LatestPrice {
            ticker: ticker.clone(),
            price,
            as_of: Utc::now(),
        };
        let json = serde_json::to_string(&entry)?;

        let mut conn = self.connection.write().await;
        conn.set_ex::<_, _, ()>(Self::price_key(ticker), json, self.ttl_secs)
            .await?;

        let event = PriceEvent::price_update(ticker.clone(), price);
        self.publish(&mut conn, CHANNEL_PRICE_UPDATE, &event).await
    }

    /// 이벤트를 지정 채널로 발행합니다.
    pub async fn publish_event(&self, channel: &str, event: &PriceEvent) -> Result<()> {
        let mut conn = self.connection.write().await;
        self.publish(&mut conn, channel, event).await
    }

    async fn publish(
        &self,
        conn: &mut MultiplexedConnection,
        channel: &str,
        event: &PriceEvent,
    ) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        conn.publish::<_, _, ()>(channel, payload)
            .await
            .map_err(DataError::from)
    }
}

#[async_trait]
impl PriceSource for RedisPriceCache {
    async fn latest_price(&self, ticker: &Ticker) -> Result<Option<Price>> {
        let mut conn = self.connection.write().await;
        let value: Option<String> = conn.get(Self::price_key(ticker)).await?;

        match value {
            Some(json) => {
                let entry: LatestPrice = serde_json::from_str(&json)?;
                Ok(Some(entry.price))
            }
            None => Ok(None),
        }
    }
}
