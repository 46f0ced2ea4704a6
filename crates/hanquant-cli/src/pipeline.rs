//! 파이프라인 조립.
//!
//! 설정에 따라 저장소/데이터 소스/엔진을 조립합니다. DB가 없으면
//! 인메모리 페이퍼 모드로 기동합니다.

use async_trait::async_trait;
use chrono::Duration;
use hanquant_core::{AppConfig, KrxCalendar, QuantError, QuantResult, Ticker};
use hanquant_data::{
    PgScoreReader, PgStockDirectory, PriceSource, RedisPriceCache, ScoreReader, StalenessGate,
    StaticPriceSource, StaticScoreReader, StaticStockDirectory, StockDirectory,
};
use hanquant_execution::{
    EntryProtection, FeeSchedule, OrderExecutor, PaperBroker, SlippageConfig, SlippageModel,
};
use hanquant_orchestrator::{
    JobSpec, Orchestrator, Stage, StageStats, SystemClock, Trigger,
};
use hanquant_portfolio::{MemoryPortfolioStore, PgPortfolioStore, PortfolioStore};
use hanquant_risk::{ConvictionScorer, PositionSizer, RiskConfig, RiskEngine};
use hanquant_signal::{PositionMonitor, SignalGenerator, SignalValidator, TradingEngine};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 조립된 파이프라인.
pub struct Pipeline {
    /// 트레이딩 엔진
    pub engine: Arc<TradingEngine>,
    /// KRX 캘린더
    pub calendar: Arc<KrxCalendar>,
}

impl Pipeline {
    /// 설정에서 파이프라인을 조립합니다.
    pub async fn build(config: &AppConfig, user: &str) -> QuantResult<Self> {
        let calendar = Arc::new(KrxCalendar::with_builtin_holidays());
        let gate = StalenessGate::new(
            calendar.clone(),
            config.validation.require_recent_data_hours,
        );

        let db_pool = match sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.database.connection_timeout_secs,
            ))
            .connect(&config.database.url)
            .await
        {
            Ok(pool) => {
                info!("database connected");
                Some(pool)
            }
            Err(e) => {
                tracing::warn!(error = %e, "database unavailable, running paper mode in memory");
                None
            }
        };

        let store: Arc<dyn PortfolioStore> = match &db_pool {
            Some(pool) => Arc::new(PgPortfolioStore::new(pool.clone())),
            None => Arc::new(MemoryPortfolioStore::new()),
        };
        // 페이퍼 계좌가 없으면 기본 초기 자본으로 개설
        store.open_account(user, dec!(100_000_000)).await?;

        let reader: Arc<dyn ScoreReader> = match &db_pool {
            Some(pool) => Arc::new(PgScoreReader::new(pool.clone(), gate.clone())),
            None => Arc::new(StaticScoreReader::new(gate.clone())),
        };
        let directory: Arc<dyn StockDirectory> = match &db_pool {
            Some(pool) => Arc::new(PgStockDirectory::new(pool.clone())),
            None => Arc::new(StaticStockDirectory::new()),
        };
        let prices: Arc<dyn PriceSource> =
            match RedisPriceCache::connect(&config.redis.url, config.redis.price_ttl_secs).await {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    tracing::warn!(error = %e, "redis unavailable, using in-memory price source");
                    Arc::new(StaticPriceSource::new())
                }
            };

        let risk_config = RiskConfig {
            max_position_size_pct: config.risk_parameters.max_position_size_pct,
            max_total_loss_pct: config.risk_parameters.max_total_loss_pct,
            risk_tolerance_pct: config.signal_generator.risk_tolerance_pct,
            min_conviction_score: config.signal_generator.min_conviction_score,
            ..RiskConfig::default()
        };

        let monitor = Arc::new(PositionMonitor::new(
            store.clone(),
            prices.clone(),
            reader.clone(),
            config.monitor.clone(),
        ));
        let generator = Arc::new(SignalGenerator::new(
            reader.clone(),
            prices.clone(),
            store.clone(),
            monitor,
            ConvictionScorer::new(risk_config.conviction_weights)?,
            PositionSizer::new(risk_config.clone())?,
            config.signal_generator.clone(),
        ));
        let validator = Arc::new(SignalValidator::new(
            store.clone(),
            reader,
            directory.clone(),
            FeeSchedule::krx_default(),
            config.validation.clone(),
            risk_config.clone(),
        ));

        if config.execution.mode != "paper" {
            // 실계좌 브로커 연동은 외부 협력자이며 이 바이너리는 페이퍼
            // 모드만 제공
            return Err(QuantError::Config(
                "live execution mode requires an external broker service".to_string(),
            ));
        }
        let slippage = SlippageModel::new(SlippageConfig {
            base_bps: config.execution.slippage_base_bps,
            volume_factor: config.execution.slippage_volume_factor,
            volatility_factor: config.execution.slippage_volatility_factor,
            seed: config.execution.slippage_seed,
            ..SlippageConfig::default()
        });
        let broker = Arc::new(PaperBroker::new(prices, slippage));
        let executor = Arc::new(OrderExecutor::new(
            store.clone(),
            broker,
            directory,
            FeeSchedule::krx_default(),
            EntryProtection {
                trailing_enabled: config.signal_generator.trailing_enabled,
                trailing_distance_pct: config.signal_generator.trailing_distance_pct,
            },
        ));
        let risk_engine = Arc::new(RiskEngine::new(store, risk_config)?);

        Ok(Self {
            engine: Arc::new(TradingEngine::new(
                generator, validator, executor, risk_engine,
            )),
            calendar,
        })
    }

    /// 데몬 모드: 오케스트레이터 스케줄로 상시 실행합니다.
    ///
    /// 데이터 수집/지표 산출/워치리스트 갱신 cron은 외부 수집기 서비스의
    /// 소관이므로 여기서는 시그널 생성, 포지션 모니터, 리스크 점검만
    /// 등록합니다.
    pub async fn run_daemon(
        &self,
        config: &AppConfig,
        user: &str,
        candidates: Vec<Ticker>,
    ) -> QuantResult<()> {
        let clock = Arc::new(SystemClock);
        let mut orchestrator = Orchestrator::new(
            self.calendar.clone(),
            clock,
            std::time::Duration::from_secs(config.orchestrator.shutdown_deadline_secs),
        );
        let grace = Duration::seconds(config.orchestrator.grace_period_secs as i64);

        orchestrator.register(
            JobSpec::new(
                "signal-generation",
                Trigger::weekday_cron(45, 8),
                Arc::new(CycleStage {
                    engine: self.engine.clone(),
                    user: user.to_string(),
                    candidates,
                }),
            )
            .with_grace_period(grace),
        );
        orchestrator.register(
            JobSpec::new(
                "position-monitor",
                Trigger::session_interval(Duration::minutes(config.monitor.interval_mins as i64)),
                Arc::new(MonitorStage {
                    engine: self.engine.clone(),
                    user: user.to_string(),
                }),
            )
            .with_grace_period(grace),
        );
        orchestrator.register(
            JobSpec::new(
                "risk-check",
                Trigger::interval(Duration::minutes(
                    config.risk_parameters.risk_check_interval_mins as i64,
                )),
                Arc::new(RiskStage {
                    engine: self.engine.clone(),
                    user: user.to_string(),
                }),
            )
            .with_grace_period(grace),
        );

        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            signal_token.cancel();
        });

        orchestrator.run(shutdown).await;
        Ok(())
    }
}

/// 전체 사이클 단계 (cron 45 8 * * MON-FRI).
struct CycleStage {
    engine: Arc<TradingEngine>,
    user: String,
    candidates: Vec<Ticker>,
}

#[async_trait]
impl Stage for CycleStage {
    async fn run(&self, cancel: CancellationToken) -> QuantResult<StageStats> {
        let cycle = self
            .engine
            .run_cycle(&self.user, &self.candidates, cancel)
            .await?;
        Ok(to_stage_stats(cycle))
    }
}

/// 포지션 모니터 단계 (장중 15분 주기).
struct MonitorStage {
    engine: Arc<TradingEngine>,
    user: String,
}

#[async_trait]
impl Stage for MonitorStage {
    async fn run(&self, cancel: CancellationToken) -> QuantResult<StageStats> {
        let cycle = self.engine.monitor_once(&self.user, cancel).await?;
        Ok(to_stage_stats(cycle))
    }
}

/// 리스크 점검 단계 (30분 주기).
struct RiskStage {
    engine: Arc<TradingEngine>,
    user: String,
}

#[async_trait]
impl Stage for RiskStage {
    async fn run(&self, cancel: CancellationToken) -> QuantResult<StageStats> {
        let cycle = self.engine.risk_check_once(&self.user, cancel).await?;
        Ok(to_stage_stats(cycle))
    }
}

fn to_stage_stats(cycle: hanquant_signal::CycleStats) -> StageStats {
    StageStats {
        processed: cycle.generated,
        succeeded: cycle.executed,
        skipped: cycle.rejected,
        failed: cycle.failed,
    }
}
