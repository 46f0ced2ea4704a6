//! KRX 수수료/세금 계산기.
//!
//! 요율표는 코드가 아닌 데이터입니다. 금액 계산은 전부 Decimal이며 각
//! 항목은 원 단위로 사사오입합니다.
//!
//! | 시장 | 수수료(양방향) | 거래세(매도) | 농특세(세액 대비, 매도) |
//! |---|---|---|---|
//! | KOSPI/KOSDAQ | 0.015% | 0.23% | 15% |
//! | KONEX | 0.015% | 0.10% | 15% |

use hanquant_core::{DecimalExt, Market, Price, Shares};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// 시장별 요율.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FeeRates {
    /// 수수료율 (매수/매도 공통, 비율)
    pub commission_rate: Decimal,
    /// 거래세율 (매도, 비율)
    pub transaction_tax_rate: Decimal,
    /// 농특세율 (거래세액 대비, 비율)
    pub surtax_rate: Decimal,
}

/// 수수료 요율표.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// KOSPI/KOSDAQ 요율
    pub main_board: FeeRates,
    /// KONEX 요율
    pub konex: FeeRates,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::krx_default()
    }
}

/// 거래 1건의 수수료 내역.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// 매수 수수료
    pub buy_commission: Decimal,
    /// 매도 수수료
    pub sell_commission: Decimal,
    /// 거래세
    pub transaction_tax: Decimal,
    /// 농특세
    pub surtax: Decimal,
}

impl FeeBreakdown {
    /// 수수료/세금 합계.
    pub fn total(&self) -> Decimal {
        self.buy_commission + self.sell_commission + self.transaction_tax + self.surtax
    }
}

impl FeeSchedule {
    /// KRX 기본 요율표.
    pub fn krx_default() -> Self {
        Self {
            main_board: FeeRates {
                commission_rate: dec!(0.00015),
                transaction_tax_rate: dec!(0.0023),
                surtax_rate: dec!(0.15),
            },
            konex: FeeRates {
                commission_rate: dec!(0.00015),
                transaction_tax_rate: dec!(0.0010),
                surtax_rate: dec!(0.15),
            },
        }
    }

    /// 시장별 요율을 반환합니다.
    pub fn rates(&self, market: Market) -> &FeeRates {
        match market {
            Market::Kospi | Market::Kosdaq => &self.main_board,
            Market::Konex => &self.konex,
        }
    }

    /// 매수 수수료 (원 단위 반올림).
    pub fn buy_commission(&self, market: Market, quantity: Shares, price: Price) -> Decimal {
        let amount = price * Decimal::from(quantity);
        (amount * self.rates(market).commission_rate).round_krw()
    }

    /// 매도 수수료 (원 단위 반올림).
    pub fn sell_commission(&self, market: Market, quantity: Shares, price: Price) -> Decimal {
        self.buy_commission(market, quantity, price)
    }

    /// 매도 거래세 (원 단위 반올림).
    pub fn transaction_tax(&self, market: Market, quantity: Shares, price: Price) -> Decimal {
        let amount = price * Decimal::from(quantity);
        (amount * self.rates(market).transaction_tax_rate).round_krw()
    }

    /// 농특세: 거래세액의 15% (원 단위 반올림).
    pub fn surtax(&self, market: Market, quantity: Shares, price: Price) -> Decimal {
        let tax = self.transaction_tax(market, quantity, price);
        (tax * self.rates(market).surtax_rate).round_krw()
    }

    /// 매도 1건의 세금 합계 (거래세 + 농특세).
    pub fn sell_taxes(&self, market: Market, quantity: Shares, price: Price) -> Decimal {
        self.transaction_tax(market, quantity, price) + self.surtax(market, quantity, price)
    }

    /// 왕복(매수 후 매도) 비용 내역.
    pub fn round_trip_cost(
        &self,
        market: Market,
        quantity: Shares,
        buy_price: Price,
        sell_price: Price,
    ) -> FeeBreakdown {
        FeeBreakdown {
            buy_commission: self.buy_commission(market, quantity, buy_price),
            sell_commission: self.sell_commission(market, quantity, sell_price),
            transaction_tax: self.transaction_tax(market, quantity, sell_price),
            surtax: self.surtax(market, quantity, sell_price),
        }
    }

    /// 왕복 순손익 = (매도가 - 매수가) * 수량 - 왕복 비용.
    pub fn net_pnl(
        &self,
        market: Market,
        quantity: Shares,
        buy_price: Price,
        sell_price: Price,
    ) -> Decimal {
        let gross = (sell_price - buy_price) * Decimal::from(quantity);
        gross - self.round_trip_cost(market, quantity, buy_price, sell_price).total()
    }

    /// 손익분기 매도가 (수수료/세금을 감안해 순손익 0이 되는 가격).
    ///
    /// s = b(1+c) / (1 - c - t(1+u)) 의 닫힌 형태를 사용합니다
    /// (c: 수수료율, t: 거래세율, u: 농특세율). 원 단위 반올림 이전의
    /// 근사값입니다.
    pub fn break_even_price(&self, market: Market, buy_price: Price) -> Price {
        let rates = self.rates(market);
        let c = rates.commission_rate;
        let t = rates.transaction_tax_rate;
        let u = rates.surtax_rate;

        let numerator = buy_price * (Decimal::ONE + c);
        let denominator = Decimal::ONE - c - t * (Decimal::ONE + u);
        (numerator / denominator).round_price()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_scenario() {
        // 매수 10주 @ 70,000, 매도 10주 @ 75,000 (KOSPI)
        let schedule = FeeSchedule::krx_default();
        let fees = schedule.round_trip_cost(Market::Kospi, 10, dec!(70_000), dec!(75_000));

        assert_eq!(fees.buy_commission, dec!(105));
        assert_eq!(fees.sell_commission, dec!(113));
        assert_eq!(fees.transaction_tax, dec!(1_725));
        assert_eq!(fees.surtax, dec!(259));
        assert_eq!(fees.total(), dec!(2_202));

        let net = schedule.net_pnl(Market::Kospi, 10, dec!(70_000), dec!(75_000));
        assert_eq!(net, dec!(47_798));
    }

    #[test]
    fn test_konex_lower_tax() {
        let schedule = FeeSchedule::krx_default();
        let kospi = schedule.sell_taxes(Market::Kospi, 10, dec!(75_000));
        let konex = schedule.sell_taxes(Market::Konex, 10, dec!(75_000));
        assert!(konex < kospi);
    }

    #[test]
    fn test_break_even_above_buy_price() {
        let schedule = FeeSchedule::krx_default();
        let break_even = schedule.break_even_price(Market::Kospi, dec!(70_000));

        assert!(break_even > dec!(70_000));
        // 손익분기점 근처에서 순손익이 0에 가까워야 함 (반올림 오차 허용)
        let net = schedule.net_pnl(Market::Kospi, 100, dec!(70_000), break_even);
        assert!(net.abs() < dec!(200), "net at break-even was {}", net);
    }

    mod laws {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // 같은 가격으로 왕복하면 순손익은 정확히 -왕복비용
            #[test]
            fn round_trip_law(
                quantity in 1i64..10_000i64,
                price in 1_000i64..2_000_000i64,
            ) {
                let schedule = FeeSchedule::krx_default();
                let price = Decimal::from(price);
                let net = schedule.net_pnl(Market::Kospi, quantity, price, price);
                let cost = schedule
                    .round_trip_cost(Market::Kospi, quantity, price, price)
                    .total();
                prop_assert_eq!(net, -cost);
            }
        }
    }
}
