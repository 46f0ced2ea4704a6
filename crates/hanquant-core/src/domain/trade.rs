//! 주문(Trade) 기록 및 생명주기 상태 머신.
//!
//! 이 모듈은 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderKind` - 주문 유형 (시장가, 지정가, 손절)
//! - `TradeStatus` - 주문 상태 (허용 전이는 DAG로 고정)
//! - `Trade` - 영속화되는 주문 엔티티

use crate::error::{QuantError, QuantResult};
use crate::types::{Price, Shares, Ticker};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// 시장가 주문
    Market,
    /// 지정가 주문
    Limit,
    /// 손절 주문
    StopLoss,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::StopLoss => write!(f, "STOP_LOSS"),
        }
    }
}

/// 주문 상태.
///
/// 허용 전이:
///
/// ```text
/// PENDING → SUBMITTED → ACCEPTED ──► FILLED
///                                ├─► PARTIALLY_FILLED → FILLED
///                                ├─► CANCELLED
///                                ├─► REJECTED
///                                ├─► EXPIRED
///                                └─► FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// 주문 생성됨 (아직 제출되지 않음)
    Pending,
    /// 브로커에 제출됨
    Submitted,
    /// 브로커가 접수함
    Accepted,
    /// 부분 체결됨
    PartiallyFilled,
    /// 전량 체결됨
    Filled,
    /// 취소됨
    Cancelled,
    /// 거부됨
    Rejected,
    /// 유효 기간 만료
    Expired,
    /// 실행 실패
    Failed,
}

impl TradeStatus {
    /// 최종 상태인지 확인합니다. 최종 상태에서는 어떤 전이도 허용되지 않습니다.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Filled
                | TradeStatus::Cancelled
                | TradeStatus::Rejected
                | TradeStatus::Expired
                | TradeStatus::Failed
        )
    }

    /// 해당 상태로의 전이가 DAG에서 허용되는지 확인합니다.
    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        matches!(
            (self, next),
            (Pending, Submitted)
                | (Submitted, Accepted)
                | (Accepted, Filled)
                | (Accepted, PartiallyFilled)
                | (Accepted, Cancelled)
                | (Accepted, Rejected)
                | (Accepted, Expired)
                | (Accepted, Failed)
                | (PartiallyFilled, Filled)
        )
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Submitted => "SUBMITTED",
            TradeStatus::Accepted => "ACCEPTED",
            TradeStatus::PartiallyFilled => "PARTIALLY_FILLED",
            TradeStatus::Filled => "FILLED",
            TradeStatus::Cancelled => "CANCELLED",
            TradeStatus::Rejected => "REJECTED",
            TradeStatus::Expired => "EXPIRED",
            TradeStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// 진입 주문 ID를 생성합니다.
///
/// 형식: `ENTRY_{ticker}_{yyyyMMdd}_{HHmmss}` (KST 아님, 생성 시각 UTC 기준
/// 이 아니라 시그널 생성 시각을 그대로 사용하므로 동일 시그널은 항상 동일
/// ID를 갖습니다. 실행 멱등성 키로 사용됩니다.)
pub fn entry_order_id(ticker: &Ticker, at: DateTime<Utc>) -> String {
    format!("ENTRY_{}_{}", ticker, at.format("%Y%m%d_%H%M%S"))
}

/// 청산 주문 ID를 생성합니다.
///
/// 형식: `EXIT_{reason}_{ticker}_{yyyyMMdd}_{HHmmss}`
pub fn exit_order_id(reason: &str, ticker: &Ticker, at: DateTime<Utc>) -> String {
    format!("EXIT_{}_{}_{}", reason, ticker, at.format("%Y%m%d_%H%M%S"))
}

/// 영속화되는 주문 기록.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// 주문 ID (유일, 멱등성 키)
    pub order_id: String,
    /// 대상 사용자
    pub user: String,
    /// 종목코드
    pub ticker: Ticker,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderKind,
    /// 요청 수량
    pub requested_quantity: Shares,
    /// 요청 가격 (지정가 주문)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_price: Option<Price>,
    /// 체결 수량 (단조 증가)
    pub executed_quantity: Shares,
    /// 평균 체결 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<Price>,
    /// 체결 금액 합계
    pub total_amount: Decimal,
    /// 수수료
    pub commission: Decimal,
    /// 거래세 (+ 농특세)
    pub tax: Decimal,
    /// 현재 상태
    pub status: TradeStatus,
    /// 주문 사유 (청산 트리거 등)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// 주문을 생성한 전략
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// 생성 타임스탬프
    pub created_at: DateTime<Utc>,
    /// 체결 완료 타임스탬프
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    /// 취소 타임스탬프
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Trade {
    /// 새 주문 기록을 생성합니다 (상태: PENDING).
    pub fn new(
        order_id: impl Into<String>,
        user: impl Into<String>,
        ticker: Ticker,
        side: Side,
        order_type: OrderKind,
        requested_quantity: Shares,
        requested_price: Option<Price>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            user: user.into(),
            ticker,
            side,
            order_type,
            requested_quantity,
            requested_price,
            executed_quantity: 0,
            executed_price: None,
            total_amount: Decimal::ZERO,
            commission: Decimal::ZERO,
            tax: Decimal::ZERO,
            status: TradeStatus::Pending,
            reason: None,
            strategy: None,
            created_at: Utc::now(),
            executed_at: None,
            cancelled_at: None,
        }
    }

    /// 주문 사유를 설정합니다.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// 전략 이름을 설정합니다.
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// 상태를 전이합니다. DAG에 없는 전이는 상태를 바꾸지 않고 실패합니다.
    pub fn transition_to(&mut self, next: TradeStatus) -> QuantResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(QuantError::Invariant(format!(
                "order {}: illegal status transition {} -> {}",
                self.order_id, self.status, next
            )));
        }
        self.status = next;
        match next {
            TradeStatus::Filled => self.executed_at = Some(Utc::now()),
            TradeStatus::Cancelled | TradeStatus::Expired => {
                self.cancelled_at = Some(Utc::now())
            }
            _ => {}
        }
        Ok(())
    }

    /// 체결분을 기록합니다. 체결 수량은 단조 증가하며 요청 수량을 넘을 수
    /// 없습니다.
    pub fn record_fill(&mut self, quantity: Shares, price: Price) -> QuantResult<()> {
        if quantity <= 0 {
            return Err(QuantError::Validation(format!(
                "order {}: fill quantity must be positive, got {}",
                self.order_id, quantity
            )));
        }
        let new_total_qty = self.executed_quantity + quantity;
        if new_total_qty > self.requested_quantity {
            return Err(QuantError::Invariant(format!(
                "order {}: fill {} would exceed requested quantity {}",
                self.order_id, new_total_qty, self.requested_quantity
            )));
        }

        let fill_amount = price * Decimal::from(quantity);
        let prior_amount = self.total_amount;
        self.executed_quantity = new_total_qty;
        self.total_amount = prior_amount + fill_amount;
        self.executed_price = Some(self.total_amount / Decimal::from(new_total_qty));
        Ok(())
    }

    /// 남은 미체결 수량을 반환합니다.
    pub fn remaining_quantity(&self) -> Shares {
        self.requested_quantity - self.executed_quantity
    }

    /// 전량 체결되었는지 확인합니다.
    pub fn is_fully_filled(&self) -> bool {
        self.executed_quantity == self.requested_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_trade() -> Trade {
        let ticker = Ticker::new("005930").unwrap();
        Trade::new(
            entry_order_id(&ticker, Utc::now()),
            "user1",
            ticker,
            Side::Buy,
            OrderKind::Limit,
            100,
            Some(dec!(70000)),
        )
    }

    #[test]
    fn test_order_id_format() {
        let ticker = Ticker::new("005930").unwrap();
        let at = chrono::DateTime::parse_from_rfc3339("2025-03-04T08:45:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(entry_order_id(&ticker, at), "ENTRY_005930_20250304_084500");
        assert_eq!(
            exit_order_id("STOP_LOSS", &ticker, at),
            "EXIT_STOP_LOSS_005930_20250304_084500"
        );
    }

    #[test]
    fn test_legal_lifecycle() {
        let mut trade = sample_trade();
        trade.transition_to(TradeStatus::Submitted).unwrap();
        trade.transition_to(TradeStatus::Accepted).unwrap();
        trade.record_fill(40, dec!(70000)).unwrap();
        trade.transition_to(TradeStatus::PartiallyFilled).unwrap();
        trade.record_fill(60, dec!(70100)).unwrap();
        trade.transition_to(TradeStatus::Filled).unwrap();

        assert!(trade.is_fully_filled());
        assert_eq!(trade.executed_quantity, 100);
        assert_eq!(trade.executed_price, Some(dec!(70060)));
        assert!(trade.executed_at.is_some());
    }

    #[test]
    fn test_terminal_state_rejects_transition() {
        let mut trade = sample_trade();
        trade.transition_to(TradeStatus::Submitted).unwrap();
        trade.transition_to(TradeStatus::Accepted).unwrap();
        trade.record_fill(100, dec!(70000)).unwrap();
        trade.transition_to(TradeStatus::Filled).unwrap();

        let err = trade.transition_to(TradeStatus::Cancelled).unwrap_err();
        assert!(matches!(err, QuantError::Invariant(_)));
        assert_eq!(trade.status, TradeStatus::Filled);
    }

    #[test]
    fn test_skip_transition_rejected() {
        let mut trade = sample_trade();
        // PENDING에서 바로 ACCEPTED로 건너뛸 수 없음
        assert!(trade.transition_to(TradeStatus::Accepted).is_err());
        assert_eq!(trade.status, TradeStatus::Pending);
    }

    #[test]
    fn test_overfill_rejected() {
        let mut trade = sample_trade();
        trade.transition_to(TradeStatus::Submitted).unwrap();
        trade.transition_to(TradeStatus::Accepted).unwrap();
        trade.record_fill(80, dec!(70000)).unwrap();

        let err = trade.record_fill(30, dec!(70000)).unwrap_err();
        assert!(matches!(err, QuantError::Invariant(_)));
        assert_eq!(trade.executed_quantity, 80);
    }
}
