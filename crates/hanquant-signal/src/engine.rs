//! 트레이딩 엔진.
//!
//! 생성기 -> 검증기 -> executor를 한 사이클로 묶습니다. CLI와
//! 오케스트레이터 데몬이 공유하는 상위 진입점입니다.
//!
//! 시그널 단위 실패는 해당 시그널만 건너뛰고 계속합니다. 거부된
//! 시그널은 사유와 함께 로깅됩니다.

use crate::generator::SignalGenerator;
use crate::validator::SignalValidator;
use hanquant_core::{QuantResult, Ticker, TradingSignal};
use hanquant_execution::OrderExecutor;
use hanquant_risk::RiskEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 사이클 실행 통계.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleStats {
    /// 생성된 시그널 수
    pub generated: usize,
    /// 검증 통과 수
    pub validated: usize,
    /// 거부 수
    pub rejected: usize,
    /// 체결 완료 수
    pub executed: usize,
    /// 실행 실패 수
    pub failed: usize,
}

/// 트레이딩 엔진.
pub struct TradingEngine {
    generator: Arc<SignalGenerator>,
    validator: Arc<SignalValidator>,
    executor: Arc<OrderExecutor>,
    risk_engine: Arc<RiskEngine>,
}

impl TradingEngine {
    /// 새 엔진을 생성합니다.
    pub fn new(
        generator: Arc<SignalGenerator>,
        validator: Arc<SignalValidator>,
        executor: Arc<OrderExecutor>,
        risk_engine: Arc<RiskEngine>,
    ) -> Self {
        Self {
            generator,
            validator,
            executor,
            risk_engine,
        }
    }

    /// 생성기 참조.
    pub fn generator(&self) -> &SignalGenerator {
        &self.generator
    }

    /// 시그널 묶음을 검증-실행합니다.
    pub async fn process_signals(
        &self,
        signals: Vec<TradingSignal>,
        cancel: &CancellationToken,
        stats: &mut CycleStats,
    ) -> QuantResult<()> {
        for signal in signals {
            // 시그널 단위 안전 지점에서 협력형 취소 확인
            if cancel.is_cancelled() {
                info!("cycle cancelled at signal boundary");
                break;
            }

            let outcome = self.validator.validate(&signal).await?;
            if !outcome.is_valid {
                stats.rejected += 1;
                warn!(
                    ticker = %signal.ticker,
                    kind = %signal.kind,
                    reason = outcome.reason.as_deref().unwrap_or("unknown"),
                    suggested_quantity = ?outcome.suggested_quantity,
                    "signal rejected"
                );
                continue;
            }
            stats.validated += 1;

            match self.executor.submit_signal(&signal).await {
                Ok(trade) => {
                    stats.executed += 1;
                    info!(
                        order_id = %trade.order_id,
                        status = %trade.status,
                        "signal executed"
                    );
                }
                Err(e) if e.is_skippable() || e.is_retryable() => {
                    stats.failed += 1;
                    warn!(ticker = %signal.ticker, error = %e, "signal execution skipped");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// 청산 -> 진입 순서로 전체 사이클 1회를 실행합니다.
    pub async fn run_cycle(
        &self,
        user: &str,
        candidates: &[Ticker],
        cancel: CancellationToken,
    ) -> QuantResult<CycleStats> {
        let mut stats = CycleStats::default();

        // 1. 청산이 먼저: 노출 축소가 신규 진입보다 우선
        let exits = self.generator.generate_exits(user).await?;
        stats.generated += exits.len();
        self.process_signals(exits, &cancel, &mut stats).await?;

        // 2. 진입
        if !cancel.is_cancelled() {
            let (entries, _) = self.generator.generate_entries(user, candidates).await?;
            stats.generated += entries.len();
            self.process_signals(entries, &cancel, &mut stats).await?;
        }

        info!(
            generated = stats.generated,
            validated = stats.validated,
            rejected = stats.rejected,
            executed = stats.executed,
            failed = stats.failed,
            "trading cycle finished"
        );
        Ok(stats)
    }

    /// 모니터 틱 1회: 트리거 청산만 실행합니다.
    pub async fn monitor_once(
        &self,
        user: &str,
        cancel: CancellationToken,
    ) -> QuantResult<CycleStats> {
        let mut stats = CycleStats::default();
        let exits = self.generator.generate_exits(user).await?;
        stats.generated += exits.len();
        self.process_signals(exits, &cancel, &mut stats).await?;
        Ok(stats)
    }

    /// 리스크 점검 1회: 서킷 브레이커 발동 시 비상 청산까지 실행합니다.
    pub async fn risk_check_once(
        &self,
        user: &str,
        cancel: CancellationToken,
    ) -> QuantResult<CycleStats> {
        let mut stats = CycleStats::default();
        let report = self.risk_engine.run_check(user).await?;

        if report.tripped {
            stats.generated += report.liquidation_signals.len();
            self.process_signals(report.liquidation_signals, &cancel, &mut stats)
                .await?;
        }
        Ok(stats)
    }
}
