//! 리스크 엔진 / 서킷 브레이커.
//!
//! 주기적으로(그리고 체결 직후에) 포트폴리오 지표를 집계하고 총손실
//! 한도를 감시합니다. 한도에 도달하면 매매 정지 플래그를 설정하고 열린
//! 포지션마다 비상 청산 시그널을 만듭니다.
//!
//! 매매 정지 플래그의 기록자는 이 엔진 하나뿐입니다. 해제는 운영자의
//! 명시적 액션(`resume_trading`)으로만 가능합니다.

use crate::config::RiskConfig;
use chrono::Utc;
use hanquant_core::{PortfolioMetrics, QuantResult, TradingSignal};
use hanquant_portfolio::{PortfolioSnapshot, PortfolioStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 리스크 점검 결과.
#[derive(Debug, Clone)]
pub struct RiskCheckReport {
    /// 갱신된 지표
    pub metrics: PortfolioMetrics,
    /// 경고 메시지 (한도의 80% 도달 시)
    pub warning: Option<String>,
    /// 이번 점검에서 서킷 브레이커가 발동했는지 여부
    pub tripped: bool,
    /// 발동 시 생성된 비상 청산 시그널 (열린 포지션당 1건)
    pub liquidation_signals: Vec<TradingSignal>,
}

/// 리스크 엔진.
pub struct RiskEngine {
    store: Arc<dyn PortfolioStore>,
    config: RiskConfig,
}

impl RiskEngine {
    /// 검증된 설정으로 리스크 엔진을 생성합니다.
    pub fn new(store: Arc<dyn PortfolioStore>, config: RiskConfig) -> QuantResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// 설정 참조를 반환합니다.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// 리스크 점검 1회를 수행합니다.
    ///
    /// 현금과 포지션은 저장소의 일관된 스냅샷에서 읽습니다.
    pub async fn run_check(&self, user: &str) -> QuantResult<RiskCheckReport> {
        let snapshot = self.store.snapshot(user).await?;
        let previous = self.store.metrics(user).await?;

        let mut metrics = self.compute_metrics(user, &snapshot, &previous);
        let mut warning = None;
        let mut tripped = false;
        let mut liquidation_signals = Vec::new();

        let ceiling = self.config.max_total_loss_pct;
        let warning_threshold = self.config.warning_threshold_pct();

        if metrics.total_loss_from_initial_pct >= ceiling {
            if !previous.trading_halted {
                tripped = true;
                let reason = format!(
                    "total loss {}% breached ceiling {}%",
                    metrics.total_loss_from_initial_pct, ceiling
                );
                error!(user = user, %reason, "circuit breaker tripped");

                self.store.set_halt(user, &reason).await?;
                metrics.trading_halted = true;
                metrics.halt_reason = Some(reason);
                metrics.halt_started_at = Some(Utc::now());

                for position in &snapshot.positions {
                    liquidation_signals.push(TradingSignal::emergency_liquidation(
                        user,
                        position.ticker.clone(),
                        position.current_price,
                    ));
                }
            }
        } else if metrics.total_loss_from_initial_pct >= warning_threshold {
            let message = format!(
                "total loss {}% approaching ceiling {}%",
                metrics.total_loss_from_initial_pct, ceiling
            );
            warn!(user = user, "{}", message);
            warning = Some(message);
        }

        self.store.store_metrics(user, &metrics).await?;
        publish_gauges(&metrics);

        Ok(RiskCheckReport {
            metrics,
            warning,
            tripped,
            liquidation_signals,
        })
    }

    /// 매매 정지를 해제합니다 (운영자 액션 전용).
    pub async fn resume_trading(&self, user: &str) -> QuantResult<()> {
        self.store.clear_halt(user).await?;
        info!(user = user, "trading resumed by operator");
        Ok(())
    }

    /// 스냅샷으로부터 지표를 집계합니다. `peak_value`는 단조 비감소입니다.
    fn compute_metrics(
        &self,
        user: &str,
        snapshot: &PortfolioSnapshot,
        previous: &PortfolioMetrics,
    ) -> PortfolioMetrics {
        let now = Utc::now();
        let total_value = snapshot.total_value();
        let invested: Decimal = snapshot.positions.iter().map(|p| p.invested_amount).sum();
        let unrealized: Decimal = snapshot.positions.iter().map(|p| p.unrealized_pnl).sum();
        let realized: Decimal = snapshot.positions.iter().map(|p| p.realized_pnl).sum();

        let peak_value = previous.peak_value.max(total_value);
        let current_drawdown_pct = if peak_value.is_zero() {
            Decimal::ZERO
        } else {
            ((peak_value - total_value) / peak_value * Decimal::ONE_HUNDRED)
                .max(Decimal::ZERO)
        };
        let max_drawdown_pct = previous.max_drawdown_pct.max(current_drawdown_pct);

        let drawdown_duration_days = if current_drawdown_pct.is_zero() {
            0
        } else {
            let elapsed = (now.date_naive() - previous.computed_at.date_naive())
                .num_days()
                .max(0);
            previous.drawdown_duration_days + elapsed
        };

        let total_loss_from_initial_pct = if snapshot.initial_capital.is_zero() {
            Decimal::ZERO
        } else {
            ((snapshot.initial_capital - total_value) / snapshot.initial_capital
                * Decimal::ONE_HUNDRED)
                .max(Decimal::ZERO)
        };

        let daily_pnl = if previous.computed_at.date_naive() == now.date_naive() {
            previous.daily_pnl + (total_value - previous.total_value)
        } else {
            Decimal::ZERO
        };

        PortfolioMetrics {
            user: user.to_string(),
            total_value,
            cash_balance: snapshot.cash_balance,
            invested_amount: invested,
            peak_value,
            initial_capital: snapshot.initial_capital,
            realized_pnl: realized,
            unrealized_pnl: unrealized,
            daily_pnl,
            current_drawdown_pct,
            max_drawdown_pct,
            drawdown_duration_days,
            position_count: snapshot.positions.len(),
            largest_position_pct: snapshot.largest_position_pct(),
            total_loss_from_initial_pct,
            trading_halted: previous.trading_halted,
            halt_reason: previous.halt_reason.clone(),
            halt_started_at: previous.halt_started_at,
            computed_at: now,
        }
    }
}

/// Prometheus 게이지로 포트폴리오 상태를 내보냅니다.
fn publish_gauges(portfolio: &PortfolioMetrics) {
    use rust_decimal::prelude::ToPrimitive;

    metrics::gauge!("portfolio_positions_open", "user" => portfolio.user.clone())
        .set(portfolio.position_count as f64);
    metrics::gauge!("portfolio_total_value", "user" => portfolio.user.clone())
        .set(portfolio.total_value.to_f64().unwrap_or(0.0));
    metrics::gauge!("portfolio_total_loss_pct", "user" => portfolio.user.clone())
        .set(portfolio.total_loss_from_initial_pct.to_f64().unwrap_or(0.0));
}
