//! 시그널 생성기.
//!
//! 진입 경로: 스크리닝된 후보 종목을 점수 필터 -> 컨빅션 -> 사이징
//! 순으로 걸러 진입 시그널을 만듭니다. 진입 시그널은 입력 종목 순서대로
//! 결정적으로 생성됩니다.
//!
//! 청산 경로: 포지션 모니터의 트리거 청산에 펀더멘털 악화 청산(진입 시점
//! 대비 종합 점수 하락)을 더합니다. 포지션당 시그널은 최대 1건이며
//! (사용자, 종목) 순서를 유지합니다.

use crate::monitor::PositionMonitor;
use hanquant_core::{
    DecimalExt, QuantResult, SignalGeneratorConfig, Ticker, TradingSignal, Urgency,
};
use hanquant_data::{PriceSource, ScoreReader};
use hanquant_portfolio::PortfolioStore;
use hanquant_risk::{ConvictionScorer, HistoricalStats, PositionSizer, SizingInput};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// 시그널 생성 통계.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationStats {
    /// 평가한 후보 수
    pub evaluated: usize,
    /// 생성된 시그널 수
    pub generated: usize,
    /// 점수/데이터 기준 미달로 건너뛴 수
    pub skipped_score: usize,
    /// 컨빅션 미달로 건너뛴 수
    pub skipped_conviction: usize,
    /// 수량 0으로 건너뛴 수
    pub skipped_sizing: usize,
}

impl GenerationStats {
    /// 요약 로그를 남깁니다.
    pub fn log_summary(&self, label: &str) {
        info!(
            evaluated = self.evaluated,
            generated = self.generated,
            skipped_score = self.skipped_score,
            skipped_conviction = self.skipped_conviction,
            skipped_sizing = self.skipped_sizing,
            "{} 완료",
            label
        );
    }
}

/// 시그널 생성기.
pub struct SignalGenerator {
    reader: Arc<dyn ScoreReader>,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn PortfolioStore>,
    monitor: Arc<PositionMonitor>,
    scorer: ConvictionScorer,
    sizer: PositionSizer,
    config: SignalGeneratorConfig,
}

impl SignalGenerator {
    /// 새 생성기를 생성합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reader: Arc<dyn ScoreReader>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn PortfolioStore>,
        monitor: Arc<PositionMonitor>,
        scorer: ConvictionScorer,
        sizer: PositionSizer,
        config: SignalGeneratorConfig,
    ) -> Self {
        Self {
            reader,
            prices,
            store,
            monitor,
            scorer,
            sizer,
            config,
        }
    }

    /// 후보 종목에서 진입 시그널을 생성합니다.
    ///
    /// 후보별 실패(오래된 데이터, 컨빅션 미달, 수량 0)는 건너뛰고
    /// 계속합니다.
    pub async fn generate_entries(
        &self,
        user: &str,
        candidates: &[Ticker],
    ) -> QuantResult<(Vec<TradingSignal>, GenerationStats)> {
        let snapshot = self.store.snapshot(user).await?;
        let portfolio_value = snapshot.total_value();
        let mut available_cash = snapshot.cash_balance;

        let mut signals = Vec::new();
        let mut stats = GenerationStats::default();

        for ticker in candidates {
            stats.evaluated += 1;
            tokio::task::yield_now().await;

            match self
                .evaluate_candidate(user, ticker, portfolio_value, available_cash)
                .await
            {
                Ok(Some(signal)) => {
                    // 같은 배치의 후속 후보는 남은 현금 기준으로 사이징
                    available_cash -= signal.current_price
                        * Decimal::from(signal.recommended_shares);
                    signals.push(signal);
                    stats.generated += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_skippable() => {
                    debug!(ticker = %ticker, error = %e, "candidate skipped");
                    stats.skipped_score += 1;
                }
                Err(e) => return Err(e),
            }
        }

        stats.log_summary("진입 시그널 생성");
        Ok((signals, stats))
    }

    async fn evaluate_candidate(
        &self,
        user: &str,
        ticker: &Ticker,
        portfolio_value: Decimal,
        available_cash: Decimal,
    ) -> QuantResult<Option<TradingSignal>> {
        // 1. 최신 점수 (오래된 데이터는 리더가 None으로 응답)
        let Some(reading) = self.reader.latest(ticker).await? else {
            debug!(ticker = %ticker, "skip: no fresh score");
            return Ok(None);
        };
        if reading.score.composite_score < self.config.min_composite_score
            || reading.score.momentum_score < self.config.min_momentum_score
        {
            debug!(
                ticker = %ticker,
                composite = %reading.score.composite_score,
                momentum = %reading.score.momentum_score,
                "skip: below score filters"
            );
            return Ok(None);
        }

        // 2. 컨빅션
        let conviction = self
            .scorer
            .score(&reading.score, reading.snapshot.volume_ratio());
        if conviction.score < self.config.min_conviction_score {
            debug!(ticker = %ticker, conviction = %conviction.score, "skip: low conviction");
            return Ok(None);
        }

        // 3. 진입가와 손절/익절 가격
        let Some(entry_price) = self.prices.latest_price(ticker).await? else {
            debug!(ticker = %ticker, "skip: no price");
            return Ok(None);
        };
        let stop_loss =
            (entry_price * (Decimal::ONE - self.config.stop_loss_pct.pct_to_ratio()))
                .round_price();
        let take_profit =
            (entry_price * (Decimal::ONE + self.config.take_profit_pct.pct_to_ratio()))
                .round_price();

        // 4. 사이징
        let sizing = self.sizer.recommend(&SizingInput {
            portfolio_value,
            available_cash,
            entry_price,
            stop_loss_price: stop_loss,
            conviction: conviction.score,
            stats: Some(HistoricalStats {
                win_rate: 0.0,
                avg_win: Decimal::ZERO,
                avg_loss: Decimal::ZERO,
                annualized_volatility: reading.snapshot.annualized_volatility,
                median_volatility: None,
            }),
        })?;
        if sizing.recommended_shares == 0 {
            debug!(ticker = %ticker, "skip: sizing yields zero shares");
            return Ok(None);
        }

        // 5. 시그널 조립
        let mut signal = TradingSignal::entry_buy(user, ticker.clone(), entry_price)
            .with_exit_prices(stop_loss, take_profit)
            .with_size(sizing.recommended_shares, sizing.position_pct)
            .with_conviction(conviction.score);
        signal.composite_score = Some(reading.score.composite_score);
        signal.target_price = Some(take_profit);
        signal.expected_return_pct = Some(self.config.take_profit_pct);
        signal.risk_reward_ratio = Some(
            (self.config.take_profit_pct / self.config.stop_loss_pct).round_pct(),
        );
        for reason in conviction.reasons {
            signal = signal.with_reason(reason);
        }

        if !self.config.use_market_orders {
            let limit = (entry_price
                * (Decimal::ONE - self.config.limit_order_discount_pct.pct_to_ratio()))
            .round_price();
            signal = signal.with_limit(limit);
        }

        Ok(Some(signal))
    }

    /// 보유 포지션에서 청산 시그널을 생성합니다.
    ///
    /// 모니터 트리거가 우선하며, 트리거가 없는 포지션에 한해 펀더멘털
    /// 악화 청산을 검사합니다.
    pub async fn generate_exits(&self, user: &str) -> QuantResult<Vec<TradingSignal>> {
        let mut signals = self.monitor.tick(user).await?;
        let triggered: HashSet<Ticker> =
            signals.iter().map(|s| s.ticker.clone()).collect();

        for position in self.store.list_positions(user).await? {
            if triggered.contains(&position.ticker) {
                continue;
            }
            let Some(entry_composite) = position.composite_score_at_entry else {
                continue;
            };
            let Some(reading) = self.reader.latest(&position.ticker).await? else {
                continue;
            };

            let threshold = entry_composite - self.config.score_deterioration_threshold;
            if reading.score.composite_score < threshold {
                debug!(
                    ticker = %position.ticker,
                    entry = %entry_composite,
                    current = %reading.score.composite_score,
                    "fundamental deterioration exit"
                );
                signals.push(
                    TradingSignal::exit_sell(
                        user,
                        position.ticker.clone(),
                        position.current_price,
                        Urgency::Normal,
                    )
                    .with_size(position.quantity, Decimal::ZERO)
                    .with_reason("score_deterioration"),
                );
            }
        }

        // (사용자, 종목) 순서 보장
        signals.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::Asia::Seoul;
    use hanquant_core::{
        CompositeScore, KrxCalendar, MonitorConfig, PositionLimits, ScoreWeights,
        SignalStrength, TechnicalSnapshot,
    };
    use hanquant_data::{StalenessGate, StaticPriceSource, StaticScoreReader};
    use hanquant_portfolio::{Fill, MemoryPortfolioStore};
    use hanquant_risk::{ConvictionWeights, RiskConfig};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryPortfolioStore>,
        reader: Arc<StaticScoreReader>,
        prices: Arc<StaticPriceSource>,
        generator: SignalGenerator,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryPortfolioStore::new());
        store.open_account("user1", dec!(100_000_000)).await.unwrap();

        let calendar = Arc::new(KrxCalendar::with_builtin_holidays());
        use chrono::TimeZone;
        let now = Seoul
            .with_ymd_and_hms(2025, 3, 5, 8, 45, 0)
            .single()
            .unwrap()
            .with_timezone(&chrono::Utc);
        let reader = Arc::new(
            StaticScoreReader::new(StalenessGate::new(calendar, 48)).with_fixed_now(now),
        );
        let prices = Arc::new(StaticPriceSource::new());

        let monitor = Arc::new(PositionMonitor::new(
            store.clone(),
            prices.clone(),
            reader.clone(),
            MonitorConfig::default(),
        ));
        let generator = SignalGenerator::new(
            reader.clone(),
            prices.clone(),
            store.clone(),
            monitor,
            ConvictionScorer::new(ConvictionWeights::default()).unwrap(),
            PositionSizer::new(RiskConfig::default()).unwrap(),
            SignalGeneratorConfig::default(),
        );

        Fixture {
            store,
            reader,
            prices,
            generator,
        }
    }

    async fn seed_score(f: &Fixture, code: &str, composite_parts: (Decimal, Decimal, Decimal, Decimal)) {
        let (value, growth, quality, momentum) = composite_parts;
        let score = CompositeScore::combine(
            Ticker::new(code).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            value,
            growth,
            quality,
            momentum,
            dec!(90),
            &ScoreWeights::default(),
        )
        .unwrap();
        let snapshot = TechnicalSnapshot {
            rsi_14: Some(55.0),
            volume_ma_20: Some(dec!(10_000_000)),
            current_volume: Some(dec!(16_000_000)),
            annualized_volatility: Some(0.3),
            ..Default::default()
        };
        f.reader.insert(score, snapshot).await;
    }

    #[tokio::test]
    async fn test_entry_signal_pipeline() {
        let f = fixture().await;
        let ticker = Ticker::new("005930").unwrap();
        seed_score(&f, "005930", (dec!(85), dec!(70), dec!(80), dec!(90))).await;
        f.prices.set_price(ticker.clone(), dec!(70_000)).await;

        let (signals, stats) = f
            .generator
            .generate_entries("user1", &[ticker.clone()])
            .await
            .unwrap();

        assert_eq!(stats.generated, 1);
        let signal = &signals[0];
        assert_eq!(signal.ticker, ticker);
        assert_eq!(signal.stop_loss_price, Some(dec!(63_000.00)));
        assert_eq!(signal.take_profit_price, Some(dec!(84_000.00)));
        // 기본 설정: 1% 할인 지정가
        assert_eq!(signal.limit_price, Some(dec!(69_300.00)));
        assert!(signal.recommended_shares > 0);
        assert_eq!(signal.strength, SignalStrength::Strong);
        assert!(signal.composite_score.is_some());
    }

    #[tokio::test]
    async fn test_low_composite_skipped() {
        let f = fixture().await;
        let ticker = Ticker::new("005930").unwrap();
        seed_score(&f, "005930", (dec!(40), dec!(40), dec!(40), dec!(55))).await;
        f.prices.set_price(ticker.clone(), dec!(70_000)).await;

        let (signals, _) = f
            .generator
            .generate_entries("user1", &[ticker])
            .await
            .unwrap();
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn test_entries_deterministic_in_input_order() {
        let f = fixture().await;
        for code in ["000660", "005930", "035720"] {
            seed_score(&f, code, (dec!(85), dec!(70), dec!(80), dec!(90))).await;
            f.prices
                .set_price(Ticker::new(code).unwrap(), dec!(50_000))
                .await;
        }

        let candidates = vec![
            Ticker::new("035720").unwrap(),
            Ticker::new("000660").unwrap(),
            Ticker::new("005930").unwrap(),
        ];
        let (signals, _) = f
            .generator
            .generate_entries("user1", &candidates)
            .await
            .unwrap();

        let order: Vec<_> = signals.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(order, vec!["035720", "000660", "005930"]);
    }

    #[tokio::test]
    async fn test_score_deterioration_exit() {
        let f = fixture().await;
        let ticker = Ticker::new("005930").unwrap();

        // 진입: 종합 점수 78.75로 기록
        f.store
            .apply_fill(
                "user1",
                &Fill {
                    order_id: "E1".to_string(),
                    ticker: ticker.clone(),
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
        f.store
            .initialize_limits(
                "user1",
                &ticker,
                &PositionLimits {
                    stop_loss_pct: dec!(10),
                    take_profit_pct: dec!(20),
                    trailing_enabled: false,
                    trailing_distance_pct: dec!(10),
                },
                Some(dec!(78)),
            )
            .await
            .unwrap();

        // 현재 점수는 진입 대비 20점 넘게 하락
        seed_score(&f, "005930", (dec!(50), dec!(50), dec!(50), dec!(60))).await;
        f.prices.set_price(ticker.clone(), dec!(69_000)).await;

        let exits = f.generator.generate_exits("user1").await.unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reasons[0], "score_deterioration");
        assert_eq!(exits[0].urgency, Urgency::Normal);
        assert_eq!(exits[0].recommended_shares, 10);
    }
}
