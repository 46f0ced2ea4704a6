//! 페이퍼 모드 슬리피지 모델.
//!
//! 체결가에 다음 bps를 가감합니다:
//!
//! ```text
//! slippage_bps = base_bps
//!              + (order_qty / avg_daily_volume) * 100 * volume_factor
//!              + annualized_volatility * volatility_factor
//! ```
//!
//! 여기에 균일 분포 ±20% 지터를 곱합니다. 난수 시드를 설정할 수 있어
//! 테스트는 결정적입니다.

use hanquant_core::{Price, Shares, Side};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;

/// 슬리피지 모델 파라미터.
#[derive(Debug, Clone)]
pub struct SlippageConfig {
    /// 기본 슬리피지 (bps)
    pub base_bps: Decimal,
    /// 거래량 충격 계수
    pub volume_factor: Decimal,
    /// 변동성 계수
    pub volatility_factor: Decimal,
    /// 지터 비율 (0.2 = ±20%)
    pub jitter: f64,
    /// 난수 시드
    pub seed: u64,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            base_bps: dec!(3),
            volume_factor: Decimal::ONE,
            volatility_factor: dec!(5),
            jitter: 0.2,
            seed: 42,
        }
    }
}

/// 슬리피지 계산에 필요한 시장 통계.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketStats {
    /// 20일 평균 거래량
    pub avg_daily_volume: Option<Decimal>,
    /// 30일 연환산 변동성 (비율)
    pub annualized_volatility: Option<f64>,
}

/// 페이퍼 슬리피지 모델.
pub struct SlippageModel {
    config: SlippageConfig,
    rng: Mutex<StdRng>,
}

impl SlippageModel {
    /// 설정된 시드로 모델을 생성합니다.
    pub fn new(config: SlippageConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// 지터 적용 전의 슬리피지 bps를 계산합니다.
    pub fn raw_bps(&self, order_qty: Shares, stats: &MarketStats) -> Decimal {
        let mut bps = self.config.base_bps;

        if let Some(adv) = stats.avg_daily_volume {
            if adv > Decimal::ZERO {
                bps += Decimal::from(order_qty) / adv * Decimal::ONE_HUNDRED
                    * self.config.volume_factor;
            }
        }
        if let Some(vol) = stats.annualized_volatility {
            bps += Decimal::try_from(vol).unwrap_or(Decimal::ZERO)
                * self.config.volatility_factor;
        }
        bps
    }

    /// 슬리피지가 반영된 체결가를 계산합니다.
    ///
    /// 매수는 불리하게 위로, 매도는 불리하게 아래로 밀립니다.
    pub fn fill_price(
        &self,
        side: Side,
        price: Price,
        order_qty: Shares,
        stats: &MarketStats,
    ) -> Price {
        let raw = self.raw_bps(order_qty, stats);

        let jitter = {
            let mut rng = self.rng.lock().expect("slippage rng lock poisoned");
            rng.gen_range(-self.config.jitter..=self.config.jitter)
        };
        let jittered =
            raw * (Decimal::ONE + Decimal::try_from(jitter).unwrap_or(Decimal::ZERO));

        let delta = price * jittered / dec!(10_000);
        let filled = match side {
            Side::Buy => price + delta,
            Side::Sell => price - delta,
        };
        filled.max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> MarketStats {
        MarketStats {
            avg_daily_volume: Some(dec!(1_000_000)),
            annualized_volatility: Some(0.4),
        }
    }

    #[test]
    fn test_raw_bps_composition() {
        let model = SlippageModel::new(SlippageConfig::default());
        // base 3 + (10_000/1_000_000)*100*1 + 0.4*5 = 3 + 1 + 2 = 6
        assert_eq!(model.raw_bps(10_000, &stats()), dec!(6));
    }

    #[test]
    fn test_buy_fills_above_sell_below() {
        let model = SlippageModel::new(SlippageConfig::default());
        let buy = model.fill_price(Side::Buy, dec!(70_000), 100, &stats());
        let sell = model.fill_price(Side::Sell, dec!(70_000), 100, &stats());

        assert!(buy > dec!(70_000));
        assert!(sell < dec!(70_000));
    }

    #[test]
    fn test_seeded_model_is_deterministic() {
        let a = SlippageModel::new(SlippageConfig::default());
        let b = SlippageModel::new(SlippageConfig::default());

        let fill_a = a.fill_price(Side::Buy, dec!(70_000), 100, &stats());
        let fill_b = b.fill_price(Side::Buy, dec!(70_000), 100, &stats());
        assert_eq!(fill_a, fill_b);
    }

    #[test]
    fn test_jitter_bounded() {
        let model = SlippageModel::new(SlippageConfig::default());
        let raw = model.raw_bps(100, &stats());
        let max_delta = dec!(70_000) * raw * dec!(1.2) / dec!(10_000);

        for _ in 0..100 {
            let fill = model.fill_price(Side::Buy, dec!(70_000), 100, &stats());
            assert!(fill - dec!(70_000) <= max_delta);
            assert!(fill >= dec!(70_000));
        }
    }
}
