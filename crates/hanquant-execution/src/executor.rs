//! 주문 executor.
//!
//! 검증된 시그널을 주문(Trade)으로 변환하고, 생명주기 DAG를 따라
//! 상태를 전이시키며, KRX 수수료/세금을 적용한 체결을 포트폴리오에
//! 반영합니다.
//!
//! 멱등성: 주문 ID는 시그널 생성 시각에서 결정적으로 유도되므로 같은
//! 시그널을 다시 제출해도 기존 주문이 그대로 반환됩니다. 체결 반영도
//! 주문 ID를 키로 멱등하므로 오케스트레이터 재기동을 가로질러
//! at-most-once 실행이 보장됩니다.

use crate::broker::{Broker, BrokerOrder, BrokerResponse};
use crate::fees::FeeSchedule;
use crate::slippage::MarketStats;
use hanquant_core::{
    entry_order_id, exit_order_id, Market, PositionLimits, Price, QuantError, QuantResult,
    Shares, Side, Ticker, Trade, TradeStatus, TradingSignal,
};
use hanquant_data::StockDirectory;
use hanquant_portfolio::{Fill, PortfolioStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// 진입 주문 체결 후 적용할 트레일링 설정.
#[derive(Debug, Clone, Copy)]
pub struct EntryProtection {
    /// 트레일링 스톱 사용 여부
    pub trailing_enabled: bool,
    /// 트레일링 거리 (%)
    pub trailing_distance_pct: Decimal,
}

impl Default for EntryProtection {
    fn default() -> Self {
        Self {
            trailing_enabled: true,
            trailing_distance_pct: Decimal::from(10),
        }
    }
}

/// 주문 executor.
pub struct OrderExecutor {
    store: Arc<dyn PortfolioStore>,
    broker: Arc<dyn Broker>,
    directory: Arc<dyn StockDirectory>,
    fees: FeeSchedule,
    protection: EntryProtection,
}

impl OrderExecutor {
    /// 새 executor를 생성합니다.
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        broker: Arc<dyn Broker>,
        directory: Arc<dyn StockDirectory>,
        fees: FeeSchedule,
        protection: EntryProtection,
    ) -> Self {
        Self {
            store,
            broker,
            directory,
            fees,
            protection,
        }
    }

    /// 수수료 계산기 참조 (손익분기 계산 등 순수 함수 용도).
    pub fn fee_schedule(&self) -> &FeeSchedule {
        &self.fees
    }

    /// 시그널에서 결정적 주문 ID를 유도합니다.
    pub fn order_id_for(signal: &TradingSignal) -> String {
        if signal.is_buy() {
            entry_order_id(&signal.ticker, signal.generated_at)
        } else {
            exit_order_id(&exit_reason_code(signal), &signal.ticker, signal.generated_at)
        }
    }

    /// 검증된 시그널을 제출합니다.
    ///
    /// 같은 시그널(같은 생성 시각)의 재제출은 기존 주문을 그대로
    /// 반환합니다. 전송 실패 시 주문은 SUBMITTED 상태로 남고, 이후
    /// 재시도가 이어서 처리합니다.
    pub async fn submit_signal(&self, signal: &TradingSignal) -> QuantResult<Trade> {
        let order_id = Self::order_id_for(signal);

        if let Some(existing) = self.store.find_trade(&order_id).await? {
            if existing.status.is_terminal() {
                info!(order_id = %order_id, status = %existing.status, "duplicate submit, returning existing trade");
                return Ok(existing);
            }
            return self.resume_trade(existing, signal).await;
        }

        let side = if signal.is_buy() { Side::Buy } else { Side::Sell };
        let quantity = self.resolve_quantity(signal, side).await?;
        if quantity <= 0 {
            return Err(QuantError::Validation(format!(
                "signal {} has no quantity to execute",
                signal.id
            )));
        }

        let mut trade = Trade::new(
            order_id.clone(),
            &signal.user,
            signal.ticker.clone(),
            side,
            signal.order_type,
            quantity,
            signal.limit_price,
        )
        .with_strategy(signal.kind.to_string());
        if let Some(reason) = signal.reasons.first() {
            trade.reason = Some(reason.clone());
        }
        self.store.record_trade(&trade).await?;

        trade.transition_to(TradeStatus::Submitted)?;
        self.store.update_trade(&trade).await?;

        self.drive_to_completion(trade, signal).await
    }

    /// 재기동 후 비종결 주문을 이어서 처리합니다.
    async fn resume_trade(&self, trade: Trade, signal: &TradingSignal) -> QuantResult<Trade> {
        match trade.status {
            TradeStatus::Pending => {
                let mut trade = trade;
                trade.transition_to(TradeStatus::Submitted)?;
                self.store.update_trade(&trade).await?;
                self.drive_to_completion(trade, signal).await
            }
            TradeStatus::Submitted => self.drive_to_completion(trade, signal).await,
            _ => Ok(trade),
        }
    }

    /// SUBMITTED 주문을 브로커에 제출하고 종결 상태까지 진행합니다.
    async fn drive_to_completion(
        &self,
        mut trade: Trade,
        signal: &TradingSignal,
    ) -> QuantResult<Trade> {
        let market = self.market_of(&trade.ticker).await;
        let stats = MarketStats {
            avg_daily_volume: None,
            annualized_volatility: None,
        };

        let order = BrokerOrder {
            order_id: trade.order_id.clone(),
            ticker: trade.ticker.clone(),
            market,
            side: trade.side,
            order_type: trade.order_type,
            quantity: trade.requested_quantity,
            limit_price: trade.requested_price,
            stats,
        };

        // 전송 실패는 SUBMITTED 상태를 유지한 채 그대로 전파
        let response = self.broker.submit_order(&order).await?;

        trade.transition_to(TradeStatus::Accepted)?;
        self.store.update_trade(&trade).await?;

        match response {
            BrokerResponse::Rejected(reason) => {
                warn!(order_id = %trade.order_id, %reason, "order rejected by broker");
                trade.reason = Some(reason);
                trade.transition_to(TradeStatus::Rejected)?;
                self.store.update_trade(&trade).await?;
                record_order_metric(&trade);
                Ok(trade)
            }
            BrokerResponse::Filled(fill) => {
                trade.record_fill(fill.executed_quantity, fill.executed_price)?;
                if trade.is_fully_filled() {
                    trade.transition_to(TradeStatus::Filled)?;
                } else {
                    trade.transition_to(TradeStatus::PartiallyFilled)?;
                }

                self.settle_fill(
                    &mut trade,
                    signal,
                    market,
                    fill.executed_quantity,
                    fill.executed_price,
                )
                .await?;

                self.store.update_trade(&trade).await?;
                record_order_metric(&trade);
                info!(
                    order_id = %trade.order_id,
                    ticker = %trade.ticker,
                    side = %trade.side,
                    quantity = fill.executed_quantity,
                    price = %fill.executed_price,
                    "order filled"
                );
                Ok(trade)
            }
        }
    }

    /// 수수료를 계산하고 체결을 포트폴리오에 반영합니다.
    async fn settle_fill(
        &self,
        trade: &mut Trade,
        signal: &TradingSignal,
        market: Market,
        quantity: Shares,
        price: Price,
    ) -> QuantResult<()> {
        let commission = self.fees.buy_commission(market, quantity, price);
        let tax = match trade.side {
            Side::Buy => Decimal::ZERO,
            Side::Sell => self.fees.sell_taxes(market, quantity, price),
        };
        trade.commission += commission;
        trade.tax += tax;

        let fill = Fill {
            order_id: trade.order_id.clone(),
            ticker: trade.ticker.clone(),
            side: trade.side,
            quantity,
            price,
            commission,
            tax,
            executed_at: trade.executed_at.unwrap_or_else(chrono::Utc::now),
        };
        let applied = self.store.apply_fill(&trade.user, &fill).await?;

        // 신규 진입이면 손절/익절/트레일링 한도를 시드
        if trade.side == Side::Buy && applied.position.stop_loss_price.is_none() {
            if let Some(limits) = entry_limits(signal, &self.protection) {
                self.store
                    .initialize_limits(
                        &trade.user,
                        &trade.ticker,
                        &limits,
                        signal.composite_score,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// 부분 체결 콜백을 적용합니다 (실계좌 브로커용).
    ///
    /// 체결 수량은 단조 증가하며, 부분 체결마다 별도 멱등성 키로
    /// 포트폴리오에 반영됩니다.
    pub async fn apply_partial_fill(
        &self,
        order_id: &str,
        quantity: Shares,
        price: Price,
    ) -> QuantResult<Trade> {
        let mut trade = self
            .store
            .find_trade(order_id)
            .await?
            .ok_or_else(|| QuantError::NotFound(format!("trade not found: {}", order_id)))?;

        if !matches!(
            trade.status,
            TradeStatus::Accepted | TradeStatus::PartiallyFilled
        ) {
            return Err(QuantError::Invariant(format!(
                "order {}: cannot apply fill in status {}",
                order_id, trade.status
            )));
        }

        trade.record_fill(quantity, price)?;
        let market = self.market_of(&trade.ticker).await;
        let commission = self.fees.buy_commission(market, quantity, price);
        let tax = match trade.side {
            Side::Buy => Decimal::ZERO,
            Side::Sell => self.fees.sell_taxes(market, quantity, price),
        };
        trade.commission += commission;
        trade.tax += tax;

        let fill = Fill {
            // 부분 체결은 체결 누계를 키에 붙여 개별적으로 멱등 처리
            order_id: format!("{}#{}", order_id, trade.executed_quantity),
            ticker: trade.ticker.clone(),
            side: trade.side,
            quantity,
            price,
            commission,
            tax,
            executed_at: chrono::Utc::now(),
        };
        self.store.apply_fill(&trade.user, &fill).await?;

        if trade.is_fully_filled() {
            trade.transition_to(TradeStatus::Filled)?;
        } else if trade.status == TradeStatus::Accepted {
            trade.transition_to(TradeStatus::PartiallyFilled)?;
        }
        self.store.update_trade(&trade).await?;
        Ok(trade)
    }

    async fn resolve_quantity(&self, signal: &TradingSignal, side: Side) -> QuantResult<Shares> {
        if side == Side::Buy || signal.recommended_shares > 0 {
            return Ok(signal.recommended_shares);
        }
        // 청산 시그널에 수량이 없으면 잔여 전량
        let position = self
            .store
            .get_position(&signal.user, &signal.ticker)
            .await?
            .ok_or_else(|| {
                QuantError::NotFound(format!(
                    "position not found: {}/{}",
                    signal.user, signal.ticker
                ))
            })?;
        Ok(position.quantity)
    }

    async fn market_of(&self, ticker: &Ticker) -> Market {
        match self.directory.get(ticker).await {
            Ok(Some(stock)) => stock.market,
            _ => {
                warn!(ticker = %ticker, "market unknown, assuming KOSPI fee schedule");
                Market::Kospi
            }
        }
    }
}

/// 청산 주문 ID에 들어갈 사유 코드.
fn exit_reason_code(signal: &TradingSignal) -> String {
    if signal.kind == hanquant_core::SignalKind::EmergencyLiquidation {
        return "EMERGENCY".to_string();
    }
    signal
        .reasons
        .first()
        .map(|r| r.to_uppercase())
        .unwrap_or_else(|| "EXIT".to_string())
}

/// 시그널의 손절/익절 가격에서 포지션 한도를 유도합니다.
fn entry_limits(signal: &TradingSignal, protection: &EntryProtection) -> Option<PositionLimits> {
    let entry = signal.current_price;
    if entry <= Decimal::ZERO {
        return None;
    }
    let stop = signal.stop_loss_price?;
    let take = signal.take_profit_price?;

    Some(PositionLimits {
        stop_loss_pct: (Decimal::ONE - stop / entry) * Decimal::ONE_HUNDRED,
        take_profit_pct: (take / entry - Decimal::ONE) * Decimal::ONE_HUNDRED,
        trailing_enabled: protection.trailing_enabled,
        trailing_distance_pct: protection.trailing_distance_pct,
    })
}

fn record_order_metric(trade: &Trade) {
    metrics::counter!(
        "trading_orders_total",
        "side" => trade.side.to_string(),
        "status" => trade.status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::slippage::{SlippageConfig, SlippageModel};
    use hanquant_core::{Market, Stock, TradingSignal};
    use hanquant_data::{StaticPriceSource, StaticStockDirectory};
    use hanquant_portfolio::MemoryPortfolioStore;
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryPortfolioStore>,
        executor: OrderExecutor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryPortfolioStore::new());
        store.open_account("user1", dec!(100_000_000)).await.unwrap();

        let prices = Arc::new(StaticPriceSource::new());
        prices
            .set_price(Ticker::new("005930").unwrap(), dec!(70_000))
            .await;

        let directory = Arc::new(StaticStockDirectory::new());
        directory
            .insert(Stock::new(
                Ticker::new("005930").unwrap(),
                "삼성전자",
                Market::Kospi,
            ))
            .await;

        // 지터 없는 슬리피지로 체결가를 결정적으로 만듦
        let slippage = SlippageModel::new(SlippageConfig {
            base_bps: Decimal::ZERO,
            volume_factor: Decimal::ZERO,
            volatility_factor: Decimal::ZERO,
            jitter: 0.0,
            seed: 7,
        });
        let broker = Arc::new(PaperBroker::new(prices, slippage));

        let executor = OrderExecutor::new(
            store.clone(),
            broker,
            directory,
            FeeSchedule::krx_default(),
            EntryProtection::default(),
        );
        Fixture { store, executor }
    }

    fn entry_signal() -> TradingSignal {
        TradingSignal::entry_buy("user1", Ticker::new("005930").unwrap(), dec!(70_000))
            .with_exit_prices(dec!(63_000), dec!(84_000))
            .with_size(142, dec!(9.94))
            .with_conviction(dec!(82))
    }

    #[tokio::test]
    async fn test_entry_fills_and_seeds_limits() {
        let f = fixture().await;
        let trade = f.executor.submit_signal(&entry_signal()).await.unwrap();

        assert_eq!(trade.status, TradeStatus::Filled);
        assert_eq!(trade.executed_quantity, 142);
        assert_eq!(trade.executed_price, Some(dec!(70_000)));
        // 9,940,000 * 0.015% = 1,491
        assert_eq!(trade.commission, dec!(1_491));
        assert_eq!(trade.tax, Decimal::ZERO);

        let position = f
            .store
            .get_position("user1", &Ticker::new("005930").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(position.quantity, 142);
        assert_eq!(position.stop_loss_price, Some(dec!(63_000.00)));
        assert_eq!(position.take_profit_price, Some(dec!(84_000.00)));
        assert!(position.trailing_stop_enabled);
    }

    #[tokio::test]
    async fn test_duplicate_submit_is_idempotent() {
        let f = fixture().await;
        let signal = entry_signal();

        let first = f.executor.submit_signal(&signal).await.unwrap();
        let cash_after_first = f.store.snapshot("user1").await.unwrap().cash_balance;

        let second = f.executor.submit_signal(&signal).await.unwrap();
        let cash_after_second = f.store.snapshot("user1").await.unwrap().cash_balance;

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(first.executed_quantity, second.executed_quantity);
        // 현금은 정확히 한 번만 차감됨
        assert_eq!(cash_after_first, cash_after_second);
    }

    #[tokio::test]
    async fn test_exit_sells_full_remaining_quantity() {
        let f = fixture().await;
        f.executor.submit_signal(&entry_signal()).await.unwrap();

        let exit = TradingSignal::exit_sell(
            "user1",
            Ticker::new("005930").unwrap(),
            dec!(75_000),
            hanquant_core::Urgency::High,
        )
        .with_reason("stop_loss");

        let trade = f.executor.submit_signal(&exit).await.unwrap();
        assert!(trade.order_id.starts_with("EXIT_STOP_LOSS_005930_"));
        assert_eq!(trade.status, TradeStatus::Filled);
        assert_eq!(trade.executed_quantity, 142);
        assert!(trade.tax > Decimal::ZERO);

        // 전량 청산 후 포지션 없음
        assert!(f
            .store
            .get_position("user1", &Ticker::new("005930").unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rejected_order_is_terminal() {
        let f = fixture().await;
        let mut signal = entry_signal();
        signal.ticker = Ticker::new("999999").unwrap();

        let trade = f.executor.submit_signal(&signal).await.unwrap();
        assert_eq!(trade.status, TradeStatus::Rejected);
        assert!(trade.reason.is_some());
        assert_eq!(trade.executed_quantity, 0);
    }
}
