//! 포트폴리오 저장소 계약.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hanquant_core::{
    Percentage, PortfolioMetrics, Position, PositionLimits, Price, QuantResult, Shares, Side,
    Ticker, Trade,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 체결 1건.
///
/// `order_id`가 멱등성 키입니다. 같은 체결을 다시 적용해도 상태는 한 번만
/// 바뀝니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    /// 주문 ID (멱등성 키)
    pub order_id: String,
    /// 종목코드
    pub ticker: Ticker,
    /// 체결 방향
    pub side: Side,
    /// 체결 수량
    pub quantity: Shares,
    /// 체결 가격
    pub price: Price,
    /// 수수료
    pub commission: Decimal,
    /// 거래세 (+ 농특세)
    pub tax: Decimal,
    /// 체결 타임스탬프
    pub executed_at: DateTime<Utc>,
}

impl Fill {
    /// 체결 금액 (가격 * 수량).
    pub fn gross_amount(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    /// 수수료/세금 합계.
    pub fn total_fees(&self) -> Decimal {
        self.commission + self.tax
    }
}

/// 체결 적용 결과.
#[derive(Debug, Clone)]
pub struct AppliedFill {
    /// 갱신된 포지션
    pub position: Position,
    /// 갱신된 현금 잔고
    pub cash_balance: Decimal,
    /// 이번 호출이 중복 재시도였는지 여부
    pub duplicate: bool,
}

/// 서킷 브레이커가 사용하는 일관된 스냅샷.
///
/// 현금과 포지션 합계는 하나의 트랜잭션 안에서 읽습니다.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    /// 열린 포지션 목록 ((사용자, 종목) 순서)
    pub positions: Vec<Position>,
    /// 현금 잔고
    pub cash_balance: Decimal,
    /// 초기 자본
    pub initial_capital: Decimal,
}

impl PortfolioSnapshot {
    /// 총 평가 금액 (현금 + 포지션 평가액 합).
    pub fn total_value(&self) -> Decimal {
        self.cash_balance
            + self
                .positions
                .iter()
                .map(|p| p.current_value)
                .sum::<Decimal>()
    }

    /// 최대 단일 포지션 비중 (%).
    pub fn largest_position_pct(&self) -> Percentage {
        let total = self.total_value();
        if total.is_zero() {
            return Decimal::ZERO;
        }
        self.positions
            .iter()
            .map(|p| p.current_value * Decimal::ONE_HUNDRED / total)
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

/// 포트폴리오 저장소.
///
/// (사용자, 종목) 단위 상태 변경은 이 인터페이스를 통해 직렬화됩니다.
/// 매매 정지 플래그의 기록자는 리스크 엔진 하나뿐입니다.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// 계좌를 초기 자본으로 개설합니다. 이미 있으면 아무것도 하지 않습니다.
    async fn open_account(&self, user: &str, initial_capital: Decimal) -> QuantResult<()>;

    /// 포지션을 조회합니다.
    async fn get_position(&self, user: &str, ticker: &Ticker) -> QuantResult<Option<Position>>;

    /// 열린 포지션 목록을 (사용자, 종목) 순서로 반환합니다.
    async fn list_positions(&self, user: &str) -> QuantResult<Vec<Position>>;

    /// 현금과 포지션의 일관된 스냅샷을 반환합니다.
    async fn snapshot(&self, user: &str) -> QuantResult<PortfolioSnapshot>;

    /// 체결을 적용합니다. 포지션과 현금을 한 트랜잭션으로 갱신하며
    /// `fill.order_id` 기준으로 멱등합니다.
    async fn apply_fill(&self, user: &str, fill: &Fill) -> QuantResult<AppliedFill>;

    /// 손절/익절/트레일링 한도를 평균 단가 기준으로 초기화합니다.
    async fn initialize_limits(
        &self,
        user: &str,
        ticker: &Ticker,
        limits: &PositionLimits,
        composite_at_entry: Option<Decimal>,
    ) -> QuantResult<Position>;

    /// 최신가로 최고가/트레일링 스톱을 갱신하고 갱신된 포지션을 반환합니다.
    /// 트레일링 스톱 가격은 절대 내려가지 않습니다.
    async fn update_trailing(
        &self,
        user: &str,
        ticker: &Ticker,
        last_price: Price,
    ) -> QuantResult<Option<Position>>;

    /// 매매 정지 플래그를 설정합니다 (단일 기록자: 리스크 엔진).
    async fn set_halt(&self, user: &str, reason: &str) -> QuantResult<()>;

    /// 매매 정지 플래그를 해제합니다 (운영자 액션).
    async fn clear_halt(&self, user: &str) -> QuantResult<()>;

    /// 매매 정지 여부를 확인합니다.
    async fn is_halted(&self, user: &str) -> QuantResult<bool>;

    /// 저장된 리스크 지표를 조회합니다.
    async fn metrics(&self, user: &str) -> QuantResult<PortfolioMetrics>;

    /// 리스크 지표를 저장합니다.
    async fn store_metrics(&self, user: &str, metrics: &PortfolioMetrics) -> QuantResult<()>;

    /// 주문 기록을 저장합니다.
    async fn record_trade(&self, trade: &Trade) -> QuantResult<()>;

    /// 주문 ID로 주문 기록을 조회합니다.
    async fn find_trade(&self, order_id: &str) -> QuantResult<Option<Trade>>;

    /// 주문 기록을 갱신합니다.
    async fn update_trade(&self, trade: &Trade) -> QuantResult<()>;
}
