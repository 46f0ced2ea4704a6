//! 정밀한 금융 계산을 위한 Decimal 유틸리티.
//!
//! 모든 금액과 퍼센트는 고정소수점(`rust_decimal::Decimal`)으로 다룹니다.
//! 이진 부동소수점은 지표 계산에만 허용되며 최종 금액 반올림은 항상
//! Decimal에서 수행합니다.

use rust_decimal::Decimal;

/// 가격 타입 (KRW, 소수점 2자리).
pub type Price = Decimal;

/// 주식 수량 타입. KRX는 소수 주식이 없으므로 정수입니다.
pub type Shares = i64;

/// 퍼센트 타입 (10.5 = 10.5%, 소수점 4자리).
pub type Percentage = Decimal;

/// 가격 소수점 자릿수 (원 단위 2자리).
pub const PRICE_SCALE: u32 = 2;

/// 퍼센트 소수점 자릿수.
pub const PCT_SCALE: u32 = 4;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 원 단위 금액으로 반올림합니다 (사사오입).
    fn round_krw(&self) -> Decimal;

    /// 가격 스케일(소수점 2자리)로 반올림합니다.
    fn round_price(&self) -> Decimal;

    /// 퍼센트 스케일(소수점 4자리)로 반올림합니다.
    fn round_pct(&self) -> Decimal;

    /// 퍼센트 값을 비율로 변환합니다 (10 -> 0.1).
    fn pct_to_ratio(&self) -> Decimal;
}

impl DecimalExt for Decimal {
    fn round_krw(&self) -> Decimal {
        self.round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }

    fn round_price(&self) -> Decimal {
        self.round_dp_with_strategy(
            PRICE_SCALE,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        )
    }

    fn round_pct(&self) -> Decimal {
        self.round_dp_with_strategy(
            PCT_SCALE,
            rust_decimal::RoundingStrategy::MidpointAwayFromZero,
        )
    }

    fn pct_to_ratio(&self) -> Decimal {
        *self / Decimal::ONE_HUNDRED
    }
}

/// 금액의 퍼센트를 계산합니다.
///
/// 예시: `pct_of(dec!(100_000_000), dec!(10))` = 10,000,000
pub fn pct_of(amount: Decimal, pct: Decimal) -> Decimal {
    amount * pct / Decimal::ONE_HUNDRED
}

/// 기준 대비 변화율(%)을 계산합니다. 기준이 0이면 0을 반환합니다.
pub fn change_pct(base: Decimal, current: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    ((current - base) / base * Decimal::ONE_HUNDRED).round_pct()
}
