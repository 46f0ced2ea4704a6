//! 포지션 모니터.
//!
//! 장중 주기(기본 15분)로 모든 열린 포지션을 훑으며:
//! 1. 최신가를 조회하고
//! 2. 최고가/트레일링 스톱을 갱신한 뒤
//! 3. 우선순위대로 트리거를 평가합니다 — 포지션당 먼저 발동한 트리거
//!    하나만 청산 시그널이 됩니다.
//!
//! 트리거 우선순위: 손절 > 트레일링 스톱 > 익절(가격) > 익절(기술적).
//! 청산 시그널은 잔여 전량이며 틱당 포지션별 최대 1건입니다.

use futures::stream::{self, StreamExt};
use hanquant_core::{
    MonitorConfig, Position, Price, QuantResult, TechnicalSnapshot, TradingSignal, Urgency,
};
use hanquant_data::{PriceSource, ScoreReader};
use hanquant_portfolio::PortfolioStore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, warn};

/// 트리거 평가 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    /// 손절: last <= stop_loss_price
    StopLoss,
    /// 트레일링 스톱: last <= trailing_stop_price
    TrailingStop,
    /// 익절 (가격): last >= take_profit_price
    TakeProfitPrice,
    /// 익절 (기술적): 과열 지표 2개 이상 동시 충족
    TakeProfitTechnical,
}

impl ExitTrigger {
    /// 주문 사유 코드.
    pub fn reason_code(&self) -> &'static str {
        match self {
            ExitTrigger::StopLoss => "stop_loss",
            ExitTrigger::TrailingStop => "trailing_stop",
            ExitTrigger::TakeProfitPrice => "take_profit",
            ExitTrigger::TakeProfitTechnical => "technical_take_profit",
        }
    }

    /// 시그널 긴급도.
    pub fn urgency(&self) -> Urgency {
        match self {
            ExitTrigger::StopLoss | ExitTrigger::TrailingStop => Urgency::High,
            ExitTrigger::TakeProfitPrice | ExitTrigger::TakeProfitTechnical => Urgency::Normal,
        }
    }
}

/// 틱 시작 시점 스냅샷에 대해 트리거를 우선순위대로 평가합니다.
///
/// 먼저 발동한 트리거 하나만 반환합니다.
pub fn evaluate_triggers(
    position: &Position,
    last_price: Price,
    snapshot: Option<&TechnicalSnapshot>,
    use_technical_take_profit: bool,
) -> Option<ExitTrigger> {
    if let Some(stop) = position.stop_loss_price {
        if last_price <= stop {
            return Some(ExitTrigger::StopLoss);
        }
    }
    if position.trailing_stop_enabled {
        if let Some(trail) = position.trailing_stop_price {
            if last_price <= trail {
                return Some(ExitTrigger::TrailingStop);
            }
        }
    }
    if let Some(take) = position.take_profit_price {
        if last_price >= take {
            return Some(ExitTrigger::TakeProfitPrice);
        }
    }
    if use_technical_take_profit {
        if let Some(snapshot) = snapshot {
            if technical_overheat_count(snapshot, last_price) >= 2 {
                return Some(ExitTrigger::TakeProfitTechnical);
            }
        }
    }
    None
}

/// 과열 지표 충족 개수: RSI>70, MACD 데드크로스, 가격>BB 상단,
/// 가격 >= 1.1*SMA20.
fn technical_overheat_count(snapshot: &TechnicalSnapshot, last_price: Price) -> usize {
    let mut count = 0;
    if snapshot.rsi_14.map(|rsi| rsi > 70.0).unwrap_or(false) {
        count += 1;
    }
    if snapshot.macd_bearish() {
        count += 1;
    }
    if snapshot
        .bb_upper
        .map(|upper| last_price > upper)
        .unwrap_or(false)
    {
        count += 1;
    }
    if snapshot
        .sma_20
        .map(|sma| last_price >= sma * dec!(1.1))
        .unwrap_or(false)
    {
        count += 1;
    }
    count
}

/// 포지션 모니터.
pub struct PositionMonitor {
    store: Arc<dyn PortfolioStore>,
    prices: Arc<dyn PriceSource>,
    reader: Arc<dyn ScoreReader>,
    config: MonitorConfig,
}

impl PositionMonitor {
    /// 새 모니터를 생성합니다.
    pub fn new(
        store: Arc<dyn PortfolioStore>,
        prices: Arc<dyn PriceSource>,
        reader: Arc<dyn ScoreReader>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            prices,
            reader,
            config,
        }
    }

    /// 모니터 틱 1회를 수행하고 청산 시그널을 (사용자, 종목) 순서로
    /// 반환합니다.
    pub async fn tick(&self, user: &str) -> QuantResult<Vec<TradingSignal>> {
        // 틱 시작 시점의 포지션 스냅샷. 이후 체결로 바뀐 상태는 이번 틱에
        // 반영되지 않습니다.
        let positions = self.store.list_positions(user).await?;
        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let signals: Vec<Option<TradingSignal>> = stream::iter(positions)
            .map(|position| self.evaluate_position(user.to_string(), position))
            .buffered(self.config.max_parallel_positions)
            .collect()
            .await;

        Ok(signals.into_iter().flatten().collect())
    }

    /// 포지션 1건을 평가합니다.
    async fn evaluate_position(
        &self,
        user: String,
        position: Position,
    ) -> Option<TradingSignal> {
        let ticker = position.ticker.clone();

        let last_price = match self.prices.latest_price(&ticker).await {
            Ok(Some(price)) => price,
            Ok(None) => {
                warn!(ticker = %ticker, "skipping position: no price available");
                return None;
            }
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "skipping position: price lookup failed");
                return None;
            }
        };

        // 트레일링 갱신 후의 상태로 트리거를 평가
        let updated = match self.store.update_trailing(&user, &ticker, last_price).await {
            Ok(Some(position)) => position,
            Ok(None) => position,
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "trailing update failed, using tick snapshot");
                position
            }
        };

        let snapshot = if self.config.take_profit_use_technical {
            match self.reader.latest(&ticker).await {
                Ok(reading) => reading.map(|r| r.snapshot),
                Err(_) => None,
            }
        } else {
            None
        };

        tokio::task::yield_now().await;

        let trigger = evaluate_triggers(
            &updated,
            last_price,
            snapshot.as_ref(),
            self.config.take_profit_use_technical,
        )?;

        debug!(
            ticker = %ticker,
            trigger = trigger.reason_code(),
            %last_price,
            "exit trigger fired"
        );

        let mut signal = TradingSignal::exit_sell(&user, ticker, last_price, trigger.urgency())
            .with_size(updated.quantity, Decimal::ZERO)
            .with_reason(trigger.reason_code());
        if trigger == ExitTrigger::TakeProfitPrice {
            if let Some(take) = updated.take_profit_price {
                signal = signal.with_limit(take);
            }
        }
        Some(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hanquant_core::{KrxCalendar, OrderKind, PositionLimits, Ticker};
    use hanquant_data::{StalenessGate, StaticPriceSource, StaticScoreReader};

    fn position_with_limits() -> Position {
        let mut position = Position::open(
            "user1",
            Ticker::new("005930").unwrap(),
            10,
            dec!(70_000),
        );
        position.initialize_limits(&PositionLimits {
            stop_loss_pct: dec!(10),
            take_profit_pct: dec!(20),
            trailing_enabled: true,
            trailing_distance_pct: dec!(10),
        });
        position
    }

    #[test]
    fn test_stop_loss_beats_trailing() {
        let mut position = position_with_limits();
        // 트레일링을 진입가 위로 끌어올린 상태에서 급락
        position.update_trailing(dec!(90_000));

        // 62,000은 손절(63,000)과 트레일링(81,000) 모두 아래지만
        // 우선순위상 손절이 먼저 발동
        let trigger = evaluate_triggers(&position, dec!(62_000), None, false);
        assert_eq!(trigger, Some(ExitTrigger::StopLoss));
    }

    #[test]
    fn test_trailing_scenario() {
        let mut position = position_with_limits();
        assert_eq!(position.trailing_stop_price, Some(dec!(63_000.00)));

        // 90,000으로 상승 -> 최고가 90,000, 트레일링 81,000
        position.update_trailing(dec!(90_000));
        assert_eq!(position.trailing_stop_price, Some(dec!(81_000.00)));

        // 80,000으로 하락: 손절(63,000) 위, 트레일링(81,000) 아래 -> 발동
        assert_eq!(
            evaluate_triggers(&position, dec!(82_000), None, false),
            None
        );
        let trigger = evaluate_triggers(&position, dec!(79_000), None, false);
        assert_eq!(trigger, Some(ExitTrigger::TrailingStop));
        assert_eq!(trigger.unwrap().urgency(), Urgency::High);
    }

    #[test]
    fn test_take_profit_price_trigger() {
        let position = position_with_limits();
        let trigger = evaluate_triggers(&position, dec!(84_000), None, false);
        assert_eq!(trigger, Some(ExitTrigger::TakeProfitPrice));
        assert_eq!(trigger.unwrap().urgency(), Urgency::Normal);
    }

    #[test]
    fn test_technical_take_profit_needs_two_conditions() {
        let mut position = position_with_limits();
        position.take_profit_price = Some(dec!(200_000));

        // 조건 1개 (RSI만 과열) -> 발동 안 함
        let one = TechnicalSnapshot {
            rsi_14: Some(75.0),
            ..Default::default()
        };
        assert_eq!(
            evaluate_triggers(&position, dec!(80_000), Some(&one), true),
            None
        );

        // 조건 2개 (RSI + BB 상단 돌파) -> 발동
        let two = TechnicalSnapshot {
            rsi_14: Some(75.0),
            bb_upper: Some(dec!(78_000)),
            ..Default::default()
        };
        assert_eq!(
            evaluate_triggers(&position, dec!(80_000), Some(&two), true),
            Some(ExitTrigger::TakeProfitTechnical)
        );
    }

    #[tokio::test]
    async fn test_tick_emits_at_most_one_exit_per_position() {
        let store = Arc::new(hanquant_portfolio::MemoryPortfolioStore::new());
        store.open_account("user1", dec!(10_000_000)).await.unwrap();
        store
            .apply_fill(
                "user1",
                &hanquant_portfolio::Fill {
                    order_id: "E1".to_string(),
                    ticker: Ticker::new("005930").unwrap(),
                    side: hanquant_core::Side::Buy,
                    quantity: 10,
                    price: dec!(70_000),
                    commission: Decimal::ZERO,
                    tax: Decimal::ZERO,
                    executed_at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();
        store
            .initialize_limits(
                "user1",
                &Ticker::new("005930").unwrap(),
                &PositionLimits {
                    stop_loss_pct: dec!(10),
                    take_profit_pct: dec!(20),
                    trailing_enabled: true,
                    trailing_distance_pct: dec!(10),
                },
                None,
            )
            .await
            .unwrap();

        let prices = Arc::new(StaticPriceSource::new());
        prices
            .set_price(Ticker::new("005930").unwrap(), dec!(62_000))
            .await;

        let gate = StalenessGate::new(Arc::new(KrxCalendar::with_builtin_holidays()), 48);
        let reader = Arc::new(StaticScoreReader::new(gate));

        let monitor = PositionMonitor::new(store, prices, reader, MonitorConfig::default());
        let signals = monitor.tick("user1").await.unwrap();

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].reasons[0], "stop_loss");
        assert_eq!(signals[0].urgency, Urgency::High);
        assert_eq!(signals[0].order_type, OrderKind::Market);
        assert_eq!(signals[0].recommended_shares, 10);
    }
}
