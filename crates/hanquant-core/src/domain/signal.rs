//! 트레이딩 시그널.
//!
//! 시그널은 검증 전까지 영속화되지 않는 인메모리 객체입니다:
//! - `SignalKind` - 시그널 종류 (진입 매수, 청산 매도, 비상 청산)
//! - `Urgency` - 긴급도
//! - `SignalStrength` - 신호 강도
//! - `TradingSignal` - 시그널 엔티티
//! - `ValidationOutcome` - 검증 결과

use crate::domain::trade::OrderKind;
use crate::types::{Percentage, Price, Shares, Ticker};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 시그널 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// 신규 진입 매수
    EntryBuy,
    /// 보유 포지션 청산 매도
    ExitSell,
    /// 서킷 브레이커 발동에 의한 비상 청산
    EmergencyLiquidation,
}

impl SignalKind {
    /// 매도 방향 시그널인지 확인합니다.
    pub fn is_sell(&self) -> bool {
        matches!(self, SignalKind::ExitSell | SignalKind::EmergencyLiquidation)
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::EntryBuy => write!(f, "entry_buy"),
            SignalKind::ExitSell => write!(f, "exit_sell"),
            SignalKind::EmergencyLiquidation => write!(f, "emergency_liquidation"),
        }
    }
}

/// 시그널 긴급도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// 낮음
    Low,
    /// 보통
    Normal,
    /// 높음 (손절/트레일링 스톱)
    High,
    /// 긴급 (비상 청산)
    Critical,
}

/// 신호 강도 (컨빅션 구간별).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    /// 약함
    Weak,
    /// 보통
    Moderate,
    /// 강함
    Strong,
}

impl SignalStrength {
    /// 컨빅션 점수 구간에서 신호 강도를 결정합니다.
    pub fn from_conviction(conviction: Decimal) -> Self {
        if conviction >= Decimal::from(80) {
            SignalStrength::Strong
        } else if conviction >= Decimal::from(70) {
            SignalStrength::Moderate
        } else {
            SignalStrength::Weak
        }
    }
}

/// 스크리닝/모니터링 결과로 생성되는 매매 시그널.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    /// 고유 시그널 ID (실행 멱등성 키)
    pub id: Uuid,
    /// 시그널 종류
    pub kind: SignalKind,
    /// 대상 사용자
    pub user: String,
    /// 종목코드
    pub ticker: Ticker,
    /// 생성 타임스탬프
    pub generated_at: DateTime<Utc>,
    /// 생성 시점 현재가
    pub current_price: Price,
    /// 목표가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_price: Option<Price>,
    /// 손절가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<Price>,
    /// 익절가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_price: Option<Price>,
    /// 권장 주문 수량
    pub recommended_shares: Shares,
    /// 포트폴리오 대비 비중 (%)
    pub position_pct: Percentage,
    /// 주문 유형
    pub order_type: OrderKind,
    /// 지정가 (지정가 주문용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Price>,
    /// 컨빅션 점수 [0, 100]
    pub conviction_score: Decimal,
    /// 생성 시점 종합 점수 (진입 시 포지션에 기록됨)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_score: Option<Decimal>,
    /// 긴급도
    pub urgency: Urgency,
    /// 신호 강도
    pub strength: SignalStrength,
    /// 시그널 근거 목록
    pub reasons: Vec<String>,
    /// 기대 수익률 (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_return_pct: Option<Percentage>,
    /// 손익비
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_reward_ratio: Option<Decimal>,
}

impl TradingSignal {
    /// 진입 매수 시그널을 생성합니다.
    pub fn entry_buy(user: impl Into<String>, ticker: Ticker, current_price: Price) -> Self {
        Self::new(SignalKind::EntryBuy, user, ticker, current_price, Urgency::Normal)
    }

    /// 청산 매도 시그널을 생성합니다.
    pub fn exit_sell(
        user: impl Into<String>,
        ticker: Ticker,
        current_price: Price,
        urgency: Urgency,
    ) -> Self {
        Self::new(SignalKind::ExitSell, user, ticker, current_price, urgency)
    }

    /// 비상 청산 시그널을 생성합니다 (긴급도 critical, 시장가 고정).
    pub fn emergency_liquidation(
        user: impl Into<String>,
        ticker: Ticker,
        current_price: Price,
    ) -> Self {
        let mut signal = Self::new(
            SignalKind::EmergencyLiquidation,
            user,
            ticker,
            current_price,
            Urgency::Critical,
        );
        signal.order_type = OrderKind::Market;
        signal
    }

    fn new(
        kind: SignalKind,
        user: impl Into<String>,
        ticker: Ticker,
        current_price: Price,
        urgency: Urgency,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            user: user.into(),
            ticker,
            generated_at: Utc::now(),
            current_price,
            target_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            recommended_shares: 0,
            position_pct: Decimal::ZERO,
            order_type: OrderKind::Market,
            limit_price: None,
            conviction_score: Decimal::ZERO,
            composite_score: None,
            urgency,
            strength: SignalStrength::Moderate,
            reasons: Vec::new(),
            expected_return_pct: None,
            risk_reward_ratio: None,
        }
    }

    /// 손절/익절 가격을 설정합니다.
    pub fn with_exit_prices(mut self, stop_loss: Price, take_profit: Price) -> Self {
        self.stop_loss_price = Some(stop_loss);
        self.take_profit_price = Some(take_profit);
        self
    }

    /// 지정가 주문으로 설정합니다.
    pub fn with_limit(mut self, limit_price: Price) -> Self {
        self.order_type = OrderKind::Limit;
        self.limit_price = Some(limit_price);
        self
    }

    /// 수량과 비중을 설정합니다.
    pub fn with_size(mut self, shares: Shares, position_pct: Percentage) -> Self {
        self.recommended_shares = shares;
        self.position_pct = position_pct;
        self
    }

    /// 컨빅션 점수를 설정하고 신호 강도를 갱신합니다.
    pub fn with_conviction(mut self, conviction: Decimal) -> Self {
        self.conviction_score = conviction;
        self.strength = SignalStrength::from_conviction(conviction);
        self
    }

    /// 근거를 추가합니다.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }

    /// 매수 시그널인지 확인합니다.
    pub fn is_buy(&self) -> bool {
        self.kind == SignalKind::EntryBuy
    }
}

/// 시그널 검증 결과.
///
/// 거부 시 사유와 함께, 통과했을 최대 수량이 있으면 `suggested_quantity`로
/// 제안합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// 검증 통과 여부
    pub is_valid: bool,
    /// 거부 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 경고 메시지
    pub warnings: Vec<String>,
    /// 한도 내에서 통과 가능한 제안 수량
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_quantity: Option<Shares>,
}

impl ValidationOutcome {
    /// 통과 결과를 생성합니다.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
            warnings: Vec::new(),
            suggested_quantity: None,
        }
    }

    /// 거부 결과를 생성합니다.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
            warnings: Vec::new(),
            suggested_quantity: None,
        }
    }

    /// 경고를 추가합니다.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// 제안 수량을 설정합니다.
    pub fn with_suggested_quantity(mut self, quantity: Shares) -> Self {
        self.suggested_quantity = Some(quantity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_entry_signal_builder() {
        let ticker = Ticker::new("005930").unwrap();
        let signal = TradingSignal::entry_buy("user1", ticker, dec!(70000))
            .with_exit_prices(dec!(63000), dec!(84000))
            .with_limit(dec!(69300))
            .with_size(142, dec!(9.94))
            .with_conviction(dec!(82))
            .with_reason("Strong value opportunity");

        assert_eq!(signal.kind, SignalKind::EntryBuy);
        assert_eq!(signal.order_type, OrderKind::Limit);
        assert_eq!(signal.strength, SignalStrength::Strong);
        assert_eq!(signal.recommended_shares, 142);
        assert_eq!(signal.reasons.len(), 1);
    }

    #[test]
    fn test_emergency_signal_is_market_critical() {
        let ticker = Ticker::new("000660").unwrap();
        let signal = TradingSignal::emergency_liquidation("user1", ticker, dec!(120000));

        assert_eq!(signal.urgency, Urgency::Critical);
        assert_eq!(signal.order_type, OrderKind::Market);
        assert!(signal.kind.is_sell());
    }

    #[test]
    fn test_strength_from_conviction() {
        assert_eq!(SignalStrength::from_conviction(dec!(65)), SignalStrength::Weak);
        assert_eq!(SignalStrength::from_conviction(dec!(75)), SignalStrength::Moderate);
        assert_eq!(SignalStrength::from_conviction(dec!(85)), SignalStrength::Strong);
    }

    #[test]
    fn test_validation_outcome() {
        let rejected = ValidationOutcome::rejected("insufficient cash")
            .with_suggested_quantity(42)
            .with_warning("portfolio near concentration limit");

        assert!(!rejected.is_valid);
        assert_eq!(rejected.suggested_quantity, Some(42));
        assert_eq!(rejected.warnings.len(), 1);
    }
}
