//! 포트폴리오 리스크 지표.

use crate::types::Percentage;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 사용자별 포트폴리오 리스크 지표.
///
/// `peak_value`는 한 런 안에서 단조 비감소입니다. 매매 정지 플래그의
/// 단일 기록자는 리스크 엔진이며 다른 컴포넌트는 읽기만 합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// 사용자
    pub user: String,
    /// 총 평가 금액 (현금 + 포지션 평가액)
    pub total_value: Decimal,
    /// 현금 잔고
    pub cash_balance: Decimal,
    /// 투자 금액
    pub invested_amount: Decimal,
    /// 최고 평가 금액
    pub peak_value: Decimal,
    /// 초기 자본
    pub initial_capital: Decimal,
    /// 실현 손익
    pub realized_pnl: Decimal,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 당일 손익
    pub daily_pnl: Decimal,
    /// 현재 낙폭 (%)
    pub current_drawdown_pct: Percentage,
    /// 최대 낙폭 (%)
    pub max_drawdown_pct: Percentage,
    /// 낙폭 지속 일수
    pub drawdown_duration_days: i64,
    /// 보유 포지션 수
    pub position_count: usize,
    /// 최대 단일 포지션 비중 (%)
    pub largest_position_pct: Percentage,
    /// 초기 자본 대비 총손실률 (%)
    pub total_loss_from_initial_pct: Percentage,
    /// 매매 정지 여부
    pub trading_halted: bool,
    /// 정지 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    /// 정지 시작 타임스탬프
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_started_at: Option<DateTime<Utc>>,
    /// 마지막 산출 타임스탬프
    pub computed_at: DateTime<Utc>,
}

impl PortfolioMetrics {
    /// 초기 자본만으로 지표를 생성합니다.
    pub fn bootstrap(user: impl Into<String>, initial_capital: Decimal) -> Self {
        Self {
            user: user.into(),
            total_value: initial_capital,
            cash_balance: initial_capital,
            invested_amount: Decimal::ZERO,
            peak_value: initial_capital,
            initial_capital,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            current_drawdown_pct: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            drawdown_duration_days: 0,
            position_count: 0,
            largest_position_pct: Decimal::ZERO,
            total_loss_from_initial_pct: Decimal::ZERO,
            trading_halted: false,
            halt_reason: None,
            halt_started_at: None,
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bootstrap_metrics() {
        let metrics = PortfolioMetrics::bootstrap("user1", dec!(10_000_000));
        assert_eq!(metrics.total_value, dec!(10_000_000));
        assert_eq!(metrics.peak_value, dec!(10_000_000));
        assert!(!metrics.trading_halted);
    }
}
