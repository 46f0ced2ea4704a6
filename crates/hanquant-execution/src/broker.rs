//! 브로커 능력 인터페이스.
//!
//! 브로커는 좁은 능력 인터페이스(주문 제출/취소/조회, 가격 조회)로만
//! 노출됩니다. 페이퍼 브로커와 실계좌 브로커는 이 인터페이스의 구현이며,
//! 슬리피지와 수수료는 정책으로 합성됩니다. 실제 증권사 프로토콜 연동은
//! 이 크레이트 범위 밖입니다.

use crate::slippage::{MarketStats, SlippageModel};
use async_trait::async_trait;
use hanquant_core::{
    Market, OrderKind, Price, QuantError, QuantResult, Shares, Side, Ticker,
};
use hanquant_data::PriceSource;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// 브로커에 제출하는 주문.
#[derive(Debug, Clone)]
pub struct BrokerOrder {
    /// 주문 ID
    pub order_id: String,
    /// 종목코드
    pub ticker: Ticker,
    /// 시장 구분
    pub market: Market,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderKind,
    /// 수량
    pub quantity: Shares,
    /// 지정가 (지정가 주문)
    pub limit_price: Option<Price>,
    /// 슬리피지 계산용 시장 통계 (페이퍼 모드)
    pub stats: MarketStats,
}

/// 브로커 체결 결과.
#[derive(Debug, Clone, Copy)]
pub struct BrokerFill {
    /// 체결 수량
    pub executed_quantity: Shares,
    /// 체결 가격
    pub executed_price: Price,
}

/// 브로커 응답.
///
/// 전송 실패(타임아웃 등)는 에러로 반환되고, 브로커가 접수 후 거부한
/// 주문은 `Rejected`로 반환됩니다.
#[derive(Debug, Clone)]
pub enum BrokerResponse {
    /// 체결됨 (페이퍼 모드는 항상 전량 체결)
    Filled(BrokerFill),
    /// 브로커가 거부함
    Rejected(String),
}

/// 브로커 능력 인터페이스.
#[async_trait]
pub trait Broker: Send + Sync {
    /// 주문을 제출합니다.
    async fn submit_order(&self, order: &BrokerOrder) -> QuantResult<BrokerResponse>;

    /// 미체결 주문을 취소합니다.
    async fn cancel_order(&self, order_id: &str) -> QuantResult<()>;

    /// 주문 체결 상태를 조회합니다 (재기동 후 복구용).
    async fn query_order(&self, order_id: &str) -> QuantResult<Option<BrokerFill>>;

    /// 현재가를 조회합니다.
    async fn get_price(&self, ticker: &Ticker) -> QuantResult<Option<Price>>;
}

/// 페이퍼 브로커.
///
/// 가격 소스의 최신가에 슬리피지를 적용해 즉시 전량 체결합니다.
pub struct PaperBroker {
    prices: Arc<dyn PriceSource>,
    slippage: SlippageModel,
}

impl PaperBroker {
    /// 새 페이퍼 브로커를 생성합니다.
    pub fn new(prices: Arc<dyn PriceSource>, slippage: SlippageModel) -> Self {
        Self { prices, slippage }
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn submit_order(&self, order: &BrokerOrder) -> QuantResult<BrokerResponse> {
        // 기준가: 지정가 주문은 지정가, 시장가 주문은 최신가
        let base_price = match (order.order_type, order.limit_price) {
            (OrderKind::Limit, Some(limit)) => limit,
            (OrderKind::Limit, None) => {
                return Ok(BrokerResponse::Rejected(
                    "limit order without limit price".to_string(),
                ))
            }
            _ => match self.prices.latest_price(&order.ticker).await? {
                Some(price) => price,
                None => {
                    return Ok(BrokerResponse::Rejected(format!(
                        "no price available for {}",
                        order.ticker
                    )))
                }
            },
        };

        if order.quantity <= 0 {
            return Ok(BrokerResponse::Rejected(format!(
                "non-positive quantity {}",
                order.quantity
            )));
        }
        if base_price <= Decimal::ZERO {
            return Err(QuantError::Invariant(format!(
                "non-positive base price {} for {}",
                base_price, order.ticker
            )));
        }

        let fill_price =
            self.slippage
                .fill_price(order.side, base_price, order.quantity, &order.stats);

        debug!(
            order_id = %order.order_id,
            ticker = %order.ticker,
            side = %order.side,
            quantity = order.quantity,
            %base_price,
            %fill_price,
            "paper fill"
        );

        Ok(BrokerResponse::Filled(BrokerFill {
            executed_quantity: order.quantity,
            executed_price: fill_price,
        }))
    }

    async fn cancel_order(&self, _order_id: &str) -> QuantResult<()> {
        // 페이퍼 모드는 즉시 체결이므로 취소할 미체결 주문이 없음
        Ok(())
    }

    async fn query_order(&self, _order_id: &str) -> QuantResult<Option<BrokerFill>> {
        Ok(None)
    }

    async fn get_price(&self, ticker: &Ticker) -> QuantResult<Option<Price>> {
        self.prices.latest_price(ticker).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slippage::SlippageConfig;
    use hanquant_data::StaticPriceSource;
    use rust_decimal_macros::dec;

    async fn paper_broker() -> PaperBroker {
        let prices = Arc::new(StaticPriceSource::new());
        prices
            .set_price(Ticker::new("005930").unwrap(), dec!(70_000))
            .await;
        PaperBroker::new(prices, SlippageModel::new(SlippageConfig::default()))
    }

    fn order(order_type: OrderKind, limit: Option<Decimal>) -> BrokerOrder {
        BrokerOrder {
            order_id: "ENTRY_005930_20250304_084500".to_string(),
            ticker: Ticker::new("005930").unwrap(),
            market: Market::Kospi,
            side: Side::Buy,
            order_type,
            quantity: 10,
            limit_price: limit,
            stats: MarketStats::default(),
        }
    }

    #[tokio::test]
    async fn test_market_order_fills_at_slipped_price() {
        let broker = paper_broker().await;
        let response = broker
            .submit_order(&order(OrderKind::Market, None))
            .await
            .unwrap();

        match response {
            BrokerResponse::Filled(fill) => {
                assert_eq!(fill.executed_quantity, 10);
                assert!(fill.executed_price >= dec!(70_000));
            }
            BrokerResponse::Rejected(reason) => panic!("unexpected rejection: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_limit_order_uses_limit_price() {
        let broker = paper_broker().await;
        let response = broker
            .submit_order(&order(OrderKind::Limit, Some(dec!(69_300))))
            .await
            .unwrap();

        match response {
            BrokerResponse::Filled(fill) => {
                // 슬리피지는 지정가 기준으로 적용됨
                assert!(fill.executed_price >= dec!(69_300));
                assert!(fill.executed_price < dec!(70_000));
            }
            BrokerResponse::Rejected(reason) => panic!("unexpected rejection: {}", reason),
        }
    }

    #[tokio::test]
    async fn test_unknown_ticker_rejected() {
        let broker = paper_broker().await;
        let mut unknown = order(OrderKind::Market, None);
        unknown.ticker = Ticker::new("999999").unwrap();

        let response = broker.submit_order(&unknown).await.unwrap();
        assert!(matches!(response, BrokerResponse::Rejected(_)));
    }
}
