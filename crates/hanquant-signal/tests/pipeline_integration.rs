//! 시그널 파이프라인 통합 테스트.
//!
//! 인메모리 저장소와 페이퍼 브로커로 진입 -> 모니터 -> 청산, 그리고
//! 서킷 브레이커 -> 비상 청산 흐름을 끝까지 실행합니다.

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Asia::Seoul;
use hanquant_core::{
    CompositeScore, KrxCalendar, Market, MonitorConfig, OrderKind, ScoreWeights,
    SignalGeneratorConfig, Stock, TechnicalSnapshot, Ticker, TradeStatus, Urgency,
    ValidationConfig,
};
use hanquant_data::{
    StalenessGate, StaticPriceSource, StaticScoreReader, StaticStockDirectory,
};
use hanquant_execution::{
    EntryProtection, FeeSchedule, OrderExecutor, PaperBroker, SlippageConfig, SlippageModel,
};
use hanquant_portfolio::{MemoryPortfolioStore, PortfolioStore};
use hanquant_risk::{ConvictionScorer, ConvictionWeights, PositionSizer, RiskConfig, RiskEngine};
use hanquant_signal::{
    PositionMonitor, SignalGenerator, SignalValidator, TradingEngine,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Harness {
    store: Arc<MemoryPortfolioStore>,
    prices: Arc<StaticPriceSource>,
    reader: Arc<StaticScoreReader>,
    engine: TradingEngine,
}

async fn harness(initial_capital: Decimal) -> Harness {
    let store = Arc::new(MemoryPortfolioStore::new());
    store.open_account("user1", initial_capital).await.unwrap();

    let calendar = Arc::new(KrxCalendar::with_builtin_holidays());
    // 점수 산출일(수요일) 다음 날 아침으로 시각 고정
    let now = Seoul
        .with_ymd_and_hms(2025, 3, 5, 8, 45, 0)
        .single()
        .unwrap()
        .with_timezone(&chrono::Utc);
    let reader = Arc::new(
        StaticScoreReader::new(StalenessGate::new(calendar, 48)).with_fixed_now(now),
    );
    let prices = Arc::new(StaticPriceSource::new());

    let directory = Arc::new(StaticStockDirectory::new());
    directory
        .insert(
            Stock::new(Ticker::new("005930").unwrap(), "삼성전자", Market::Kospi)
                .with_sector("전기전자"),
        )
        .await;

    let risk_config = RiskConfig::default();
    let monitor = Arc::new(PositionMonitor::new(
        store.clone(),
        prices.clone(),
        reader.clone(),
        MonitorConfig::default(),
    ));
    let generator = Arc::new(SignalGenerator::new(
        reader.clone(),
        prices.clone(),
        store.clone(),
        monitor,
        ConvictionScorer::new(ConvictionWeights::default()).unwrap(),
        PositionSizer::new(risk_config.clone()).unwrap(),
        SignalGeneratorConfig {
            use_market_orders: true,
            // take profit far above so the trailing stop fires first
            take_profit_pct: dec!(50),
            ..Default::default()
        },
    ));
    let validator = Arc::new(SignalValidator::new(
        store.clone(),
        reader.clone(),
        directory.clone(),
        FeeSchedule::krx_default(),
        ValidationConfig::default(),
        risk_config.clone(),
    ));

    let slippage = SlippageModel::new(SlippageConfig {
        base_bps: Decimal::ZERO,
        volume_factor: Decimal::ZERO,
        volatility_factor: Decimal::ZERO,
        jitter: 0.0,
        seed: 7,
    });
    let broker = Arc::new(PaperBroker::new(prices.clone(), slippage));
    let executor = Arc::new(OrderExecutor::new(
        store.clone(),
        broker,
        directory,
        FeeSchedule::krx_default(),
        EntryProtection::default(),
    ));
    let risk_engine = Arc::new(RiskEngine::new(store.clone(), risk_config).unwrap());

    Harness {
        store: store.clone(),
        prices,
        reader,
        engine: TradingEngine::new(generator, validator, executor, risk_engine),
    }
}

async fn seed_strong_score(harness: &Harness, code: &str) {
    let score = CompositeScore::combine(
        Ticker::new(code).unwrap(),
        NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
        dec!(85),
        dec!(70),
        dec!(80),
        dec!(90),
        dec!(95),
        &ScoreWeights::default(),
    )
    .unwrap();
    let snapshot = TechnicalSnapshot {
        rsi_14: Some(55.0),
        macd: Some(120.0),
        macd_signal: Some(110.0),
        bb_upper: Some(dec!(74_000)),
        bb_lower: Some(dec!(66_000)),
        sma_20: Some(dec!(69_000)),
        atr_14: Some(dec!(1_500)),
        volume_ma_20: Some(dec!(10_000_000)),
        current_volume: Some(dec!(16_000_000)),
        ..Default::default()
    };
    harness.reader.insert(score, snapshot).await;
}

/// 진입부터 트레일링 스톱 청산까지의 생애주기.
///
/// 70,000 매수 (트레일링 10% -> 63,000) -> 90,000 상승 (트레일링
/// 81,000) -> 80,000 하락 (트리거 없음) -> 79,000 하락 (트레일링 발동,
/// 시장가 청산).
#[tokio::test]
async fn trailing_stop_lifecycle() {
    let h = harness(dec!(100_000_000)).await;
    let ticker = Ticker::new("005930").unwrap();
    seed_strong_score(&h, "005930").await;
    h.prices.set_price(ticker.clone(), dec!(70_000)).await;

    // 1. 진입 사이클
    let stats = h
        .engine
        .run_cycle("user1", &[ticker.clone()], CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.executed, 1);

    let position = h.store.get_position("user1", &ticker).await.unwrap().unwrap();
    assert!(position.quantity > 0);
    assert_eq!(position.trailing_stop_price, Some(dec!(63_000.00)));
    let entry_quantity = position.quantity;

    // 2. 90,000 상승: 모니터 틱이 트레일링을 81,000으로 끌어올림
    h.prices.set_price(ticker.clone(), dec!(90_000)).await;
    let stats = h
        .engine
        .monitor_once("user1", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.generated, 0);

    let position = h.store.get_position("user1", &ticker).await.unwrap().unwrap();
    assert_eq!(position.highest_price_since_purchase, dec!(90_000));
    assert_eq!(position.trailing_stop_price, Some(dec!(81_000.00)));

    // 3. 80,000 하락: 트리거 없음 (82,000에서 한 번 더 확인)
    h.prices.set_price(ticker.clone(), dec!(82_000)).await;
    let stats = h
        .engine
        .monitor_once("user1", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.generated, 0);

    // 4. 79,000 하락: 트레일링 스톱 발동, 전량 시장가 청산
    h.prices.set_price(ticker.clone(), dec!(79_000)).await;
    let stats = h
        .engine
        .monitor_once("user1", CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stats.generated, 1);
    assert_eq!(stats.executed, 1);

    // 포지션은 아카이브되고 실현 손익이 남음
    assert!(h.store.get_position("user1", &ticker).await.unwrap().is_none());

    let snapshot = h.store.snapshot("user1").await.unwrap();
    // 70,000 진입 -> 79,000 청산이므로 수수료를 내고도 수익이 남음
    assert!(snapshot.cash_balance > dec!(100_000_000));
    assert!(entry_quantity > 0);
}

/// 서킷 브레이커: 손실 28% 도달 -> 정지 + 비상 청산, 이후 매수 거부 /
/// 매도 허용.
#[tokio::test]
async fn circuit_breaker_halts_and_liquidates() {
    let h = harness(dec!(10_000_000)).await;
    let ticker = Ticker::new("005930").unwrap();
    seed_strong_score(&h, "005930").await;
    h.prices.set_price(ticker.clone(), dec!(80_000)).await;

    // 수수료 없는 체결로 100주 매입 (현금 2,000,000 잔류)
    h.store
        .apply_fill(
            "user1",
            &hanquant_portfolio::Fill {
                order_id: "SEED".to_string(),
                ticker: ticker.clone(),
                side: hanquant_core::Side::Buy,
                quantity: 100,
                price: dec!(80_000),
                commission: Decimal::ZERO,
                tax: Decimal::ZERO,
                executed_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    // 주가 52,000으로 급락: 총 평가 7,200,000 -> 손실 28%
    h.prices.set_price(ticker.clone(), dec!(52_000)).await;
    h.store
        .update_trailing("user1", &ticker, dec!(52_000))
        .await
        .unwrap();

    let stats = h
        .engine
        .risk_check_once("user1", CancellationToken::new())
        .await
        .unwrap();

    // 비상 청산이 검증을 통과해 실행됨
    assert_eq!(stats.generated, 1);
    assert_eq!(stats.executed, 1);
    assert!(h.store.is_halted("user1").await.unwrap());
    assert!(h.store.get_position("user1", &ticker).await.unwrap().is_none());

    // 정지 중 신규 매수는 거부
    let buy = hanquant_core::TradingSignal::entry_buy("user1", ticker.clone(), dec!(52_000))
        .with_size(10, dec!(5))
        .with_conviction(dec!(90));
    let mut cycle = hanquant_signal::CycleStats::default();
    h.engine
        .process_signals(vec![buy], &CancellationToken::new(), &mut cycle)
        .await
        .unwrap();
    assert_eq!(cycle.rejected, 1);
    assert_eq!(cycle.executed, 0);

    // 운영자 해제 전까지 정지 유지
    assert!(h.store.is_halted("user1").await.unwrap());
}

/// 같은 시그널 재제출은 주문/현금에 한 번만 반영됨.
#[tokio::test]
async fn duplicate_signal_submission_is_at_most_once() {
    let h = harness(dec!(100_000_000)).await;
    let ticker = Ticker::new("005930").unwrap();
    seed_strong_score(&h, "005930").await;
    h.prices.set_price(ticker.clone(), dec!(70_000)).await;

    let (signals, _) = h
        .engine
        .generator()
        .generate_entries("user1", &[ticker.clone()])
        .await
        .unwrap();
    let signal = signals.into_iter().next().unwrap();
    let expected_quantity = signal.recommended_shares;

    let mut cycle = hanquant_signal::CycleStats::default();
    h.engine
        .process_signals(
            vec![signal.clone(), signal],
            &CancellationToken::new(),
            &mut cycle,
        )
        .await
        .unwrap();

    // 두 번 제출했지만 포지션 수량과 현금 차감은 한 번 분량
    let snapshot = h.store.snapshot("user1").await.unwrap();
    let position = h.store.get_position("user1", &ticker).await.unwrap().unwrap();
    assert_eq!(position.quantity, expected_quantity);

    let invested = position.avg_price * Decimal::from(position.quantity);
    let commission = FeeSchedule::krx_default().buy_commission(
        Market::Kospi,
        position.quantity,
        position.avg_price,
    );
    assert_eq!(
        snapshot.cash_balance,
        dec!(100_000_000) - invested - commission
    );
}

/// 체결된 주문의 상태는 FILLED로 종결됨.
#[tokio::test]
async fn filled_trade_is_terminal() {
    let h = harness(dec!(100_000_000)).await;
    let ticker = Ticker::new("005930").unwrap();
    seed_strong_score(&h, "005930").await;
    h.prices.set_price(ticker.clone(), dec!(70_000)).await;

    let (signals, _) = h
        .engine
        .generator()
        .generate_entries("user1", &[ticker.clone()])
        .await
        .unwrap();
    let signal = &signals[0];
    assert_eq!(signal.order_type, OrderKind::Market);
    assert_eq!(signal.urgency, Urgency::Normal);

    let mut cycle = hanquant_signal::CycleStats::default();
    h.engine
        .process_signals(vec![signal.clone()], &CancellationToken::new(), &mut cycle)
        .await
        .unwrap();

    let order_id = hanquant_execution::OrderExecutor::order_id_for(signal);
    let trade = h.store.find_trade(&order_id).await.unwrap().unwrap();
    assert_eq!(trade.status, TradeStatus::Filled);
    assert!(trade.executed_quantity <= trade.requested_quantity);
}
