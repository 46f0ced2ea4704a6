//! 포지션 추적 및 관리.
//!
//! (사용자, 종목) 단위 보유 현황입니다. 최초 매수 시 생성되고, 체결과
//! 모니터 틱마다 갱신되며, 전량 청산 시 실현 손익을 보존한 채 아카이브
//! 됩니다(삭제되지 않음).

use crate::error::{QuantError, QuantResult};
use crate::types::{change_pct, DecimalExt, Percentage, Price, Shares, Ticker};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 포지션의 손절/익절/트레일링 설정.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionLimits {
    /// 손절 비율 (%)
    pub stop_loss_pct: Percentage,
    /// 익절 비율 (%)
    pub take_profit_pct: Percentage,
    /// 트레일링 스톱 사용 여부
    pub trailing_enabled: bool,
    /// 트레일링 거리 (%)
    pub trailing_distance_pct: Percentage,
}

/// (사용자, 종목)별 보유 포지션.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 사용자
    pub user: String,
    /// 종목코드
    pub ticker: Ticker,
    /// 보유 수량
    pub quantity: Shares,
    /// 평균 매입 단가
    pub avg_price: Price,
    /// 현재가
    pub current_price: Price,
    /// 평가 금액
    pub current_value: Decimal,
    /// 투자 원금
    pub invested_amount: Decimal,
    /// 실현 손익
    pub realized_pnl: Decimal,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 미실현 손익률 (%)
    pub unrealized_pnl_pct: Percentage,
    /// 손절가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<Price>,
    /// 손절 비율 (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<Percentage>,
    /// 익절가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_price: Option<Price>,
    /// 익절 비율 (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<Percentage>,
    /// 트레일링 스톱 사용 여부
    pub trailing_stop_enabled: bool,
    /// 트레일링 거리 (%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_stop_distance_pct: Option<Percentage>,
    /// 트레일링 스톱 가격 (보유 중 단조 비감소)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_stop_price: Option<Price>,
    /// 매수 후 최고가 (평균 단가 이상)
    pub highest_price_since_purchase: Price,
    /// 진입 시점 종합 점수 (펀더멘털 악화 청산 판정용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_score_at_entry: Option<Decimal>,
    /// 최초 매수 타임스탬프
    pub first_purchase_at: DateTime<Utc>,
    /// 마지막 거래 타임스탬프
    pub last_transaction_at: DateTime<Utc>,
    /// 아카이브 타임스탬프 (전량 청산 시 설정)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl Position {
    /// 최초 매수 체결로 새 포지션을 생성합니다.
    pub fn open(user: impl Into<String>, ticker: Ticker, quantity: Shares, price: Price) -> Self {
        let now = Utc::now();
        let value = price * Decimal::from(quantity);
        Self {
            user: user.into(),
            ticker,
            quantity,
            avg_price: price,
            current_price: price,
            current_value: value,
            invested_amount: value,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            stop_loss_price: None,
            stop_loss_pct: None,
            take_profit_price: None,
            take_profit_pct: None,
            trailing_stop_enabled: false,
            trailing_stop_distance_pct: None,
            trailing_stop_price: None,
            highest_price_since_purchase: price,
            composite_score_at_entry: None,
            first_purchase_at: now,
            last_transaction_at: now,
            archived_at: None,
        }
    }

    /// 포지션이 열려 있는지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.quantity > 0 && self.archived_at.is_none()
    }

    /// 매수 체결을 반영합니다. 평균 단가를 재계산합니다.
    pub fn apply_buy(&mut self, quantity: Shares, price: Price) -> QuantResult<()> {
        if quantity <= 0 {
            return Err(QuantError::Validation(format!(
                "position {}: buy quantity must be positive",
                self.ticker
            )));
        }
        let old_cost = self.avg_price * Decimal::from(self.quantity);
        let added_cost = price * Decimal::from(quantity);
        self.quantity += quantity;
        self.avg_price = ((old_cost + added_cost) / Decimal::from(self.quantity)).round_price();
        self.invested_amount += added_cost;
        self.last_transaction_at = Utc::now();
        self.update_price(price);
        Ok(())
    }

    /// 매도 체결을 반영하고 실현 손익을 반환합니다.
    ///
    /// 실현 손익 = (체결가 - 평균 단가) * 수량 - 수수료/세금.
    /// 평균 단가는 매도로 바뀌지 않습니다. 수량이 0이 되면 아카이브됩니다.
    pub fn apply_sell(&mut self, quantity: Shares, price: Price, fees: Decimal) -> QuantResult<Decimal> {
        if quantity <= 0 {
            return Err(QuantError::Validation(format!(
                "position {}: sell quantity must be positive",
                self.ticker
            )));
        }
        if quantity > self.quantity {
            return Err(QuantError::Business(format!(
                "position {}: cannot sell {} with only {} held",
                self.ticker, quantity, self.quantity
            )));
        }

        let pnl = (price - self.avg_price) * Decimal::from(quantity) - fees;
        self.quantity -= quantity;
        self.realized_pnl += pnl;
        self.invested_amount = self.avg_price * Decimal::from(self.quantity);
        self.last_transaction_at = Utc::now();

        if self.quantity == 0 {
            self.archived_at = Some(Utc::now());
        }
        self.update_price(price);
        Ok(pnl)
    }

    /// 현재가를 갱신하고 평가 손익을 재계산합니다.
    pub fn update_price(&mut self, price: Price) {
        self.current_price = price;
        self.current_value = price * Decimal::from(self.quantity);
        self.unrealized_pnl = (price - self.avg_price) * Decimal::from(self.quantity);
        self.unrealized_pnl_pct = change_pct(self.avg_price, price);
    }

    /// 손절/익절/트레일링 한도를 평균 단가 기준으로 초기화합니다.
    ///
    /// 최고가는 평균 단가로, 트레일링 스톱 가격은
    /// `평균단가 * (1 - 트레일링거리/100)`로 시드합니다.
    pub fn initialize_limits(&mut self, limits: &PositionLimits) {
        let one = Decimal::ONE;
        self.stop_loss_pct = Some(limits.stop_loss_pct);
        self.stop_loss_price =
            Some((self.avg_price * (one - limits.stop_loss_pct.pct_to_ratio())).round_price());
        self.take_profit_pct = Some(limits.take_profit_pct);
        self.take_profit_price =
            Some((self.avg_price * (one + limits.take_profit_pct.pct_to_ratio())).round_price());
        self.trailing_stop_enabled = limits.trailing_enabled;
        self.trailing_stop_distance_pct = Some(limits.trailing_distance_pct);
        self.highest_price_since_purchase = self.avg_price;
        self.trailing_stop_price = Some(
            (self.avg_price * (one - limits.trailing_distance_pct.pct_to_ratio())).round_price(),
        );
    }

    /// 최고가와 트레일링 스톱 가격을 갱신합니다.
    ///
    /// 트레일링 스톱 가격은 절대 내려가지 않습니다. 갱신되면 `true`를
    /// 반환합니다.
    pub fn update_trailing(&mut self, last_price: Price) -> bool {
        if !self.trailing_stop_enabled || last_price <= self.highest_price_since_purchase {
            return false;
        }
        self.highest_price_since_purchase = last_price;

        let Some(distance_pct) = self.trailing_stop_distance_pct else {
            return false;
        };
        let candidate =
            (last_price * (Decimal::ONE - distance_pct.pct_to_ratio())).round_price();
        let current = self.trailing_stop_price.unwrap_or(Decimal::ZERO);
        if candidate > current {
            self.trailing_stop_price = Some(candidate);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits() -> PositionLimits {
        PositionLimits {
            stop_loss_pct: dec!(10),
            take_profit_pct: dec!(20),
            trailing_enabled: true,
            trailing_distance_pct: dec!(10),
        }
    }

    #[test]
    fn test_buy_recomputes_avg_price() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        position.apply_buy(10, dec!(72000)).unwrap();

        assert_eq!(position.quantity, 20);
        assert_eq!(position.avg_price, dec!(71000));
    }

    #[test]
    fn test_sell_banks_realized_pnl_and_keeps_avg() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        let pnl = position.apply_sell(4, dec!(75000), dec!(880)).unwrap();

        assert_eq!(pnl, dec!(19120)); // (75000-70000)*4 - 880
        assert_eq!(position.quantity, 6);
        assert_eq!(position.avg_price, dec!(70000));
        assert!(position.is_open());
    }

    #[test]
    fn test_full_exit_archives_with_pnl() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        position.apply_sell(10, dec!(75000), dec!(2202)).unwrap();

        assert_eq!(position.quantity, 0);
        assert!(!position.is_open());
        assert!(position.archived_at.is_some());
        assert_eq!(position.realized_pnl, dec!(47798));
    }

    #[test]
    fn test_oversell_rejected() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        assert!(position.apply_sell(11, dec!(75000), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_initialize_limits_seeds_trailing() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        position.initialize_limits(&limits());

        assert_eq!(position.stop_loss_price, Some(dec!(63000.00)));
        assert_eq!(position.take_profit_price, Some(dec!(84000.00)));
        assert_eq!(position.trailing_stop_price, Some(dec!(63000.00)));
        assert_eq!(position.highest_price_since_purchase, dec!(70000));
    }

    #[test]
    fn test_trailing_never_decreases() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        position.initialize_limits(&limits());

        // 상승: 최고가와 트레일링 모두 갱신
        assert!(position.update_trailing(dec!(90000)));
        assert_eq!(position.highest_price_since_purchase, dec!(90000));
        assert_eq!(position.trailing_stop_price, Some(dec!(81000.00)));

        // 하락: 어느 쪽도 갱신되지 않음
        assert!(!position.update_trailing(dec!(80000)));
        assert_eq!(position.highest_price_since_purchase, dec!(90000));
        assert_eq!(position.trailing_stop_price, Some(dec!(81000.00)));
    }

    #[test]
    fn test_highest_price_at_least_avg_after_update() {
        let ticker = Ticker::new("005930").unwrap();
        let mut position = Position::open("user1", ticker, 10, dec!(70000));
        position.initialize_limits(&limits());

        position.update_trailing(dec!(65000));
        assert!(position.highest_price_since_purchase >= position.avg_price);
    }
}
