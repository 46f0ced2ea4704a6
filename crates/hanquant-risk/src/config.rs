//! 리스크 계층 설정.

use hanquant_core::{QuantError, QuantResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 가중치 합 검증 허용 오차.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// 컨빅션 점수 가중치.
///
/// 합은 1.0 ± 1e-6 이어야 합니다.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConvictionWeights {
    /// 가치 요소 가중치
    pub value: f64,
    /// 모멘텀 요소 가중치
    pub momentum: f64,
    /// 거래량 요소 가중치
    pub volume: f64,
    /// 퀄리티 요소 가중치
    pub quality: f64,
}

impl Default for ConvictionWeights {
    fn default() -> Self {
        Self {
            value: 0.30,
            momentum: 0.30,
            volume: 0.20,
            quality: 0.20,
        }
    }
}

impl ConvictionWeights {
    /// 가중치 합이 1.0 ± 1e-6인지 검증합니다.
    pub fn validate(&self) -> QuantResult<()> {
        let sum = self.value + self.momentum + self.volume + self.quality;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(QuantError::Config(format!(
                "conviction weights must sum to 1.0, got {}",
                sum
            )));
        }
        if [self.value, self.momentum, self.volume, self.quality]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(QuantError::Config(
                "conviction weights must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 포지션 사이징 방법.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    /// 포트폴리오 고정 비율
    FixedPercent,
    /// 손절까지의 리스크 고정
    FixedRisk,
    /// 변동성 역비례
    VolatilityAdjusted,
    /// Kelly 전액
    KellyFull,
    /// Half-Kelly (Kelly 계열 기본값)
    KellyHalf,
    /// Quarter-Kelly
    KellyQuarter,
}

/// 리스크 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// 컨빅션 가중치
    pub conviction_weights: ConvictionWeights,
    /// 최소 컨빅션 점수 (미만이면 수량 0)
    pub min_conviction_score: Decimal,
    /// 사이징 방법
    pub sizing_method: SizingMethod,
    /// 단일 포지션 최대 비중 (%)
    pub max_position_size_pct: Decimal,
    /// 거래당 리스크 허용치 (%)
    pub risk_tolerance_pct: Decimal,
    /// 초기 자본 대비 총손실 한도 (%). 문서상 28%/30%가 혼재하지만
    /// 단일 설정값이며 기본값은 28입니다.
    pub max_total_loss_pct: Decimal,
    /// 경고 발생 비율 (한도 대비, 0.8 = 한도의 80%)
    pub warning_ratio: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            conviction_weights: ConvictionWeights::default(),
            min_conviction_score: Decimal::from(60),
            sizing_method: SizingMethod::FixedRisk,
            max_position_size_pct: Decimal::from(10),
            risk_tolerance_pct: Decimal::TWO,
            max_total_loss_pct: Decimal::from(28),
            warning_ratio: Decimal::new(8, 1),
        }
    }
}

impl RiskConfig {
    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> QuantResult<()> {
        self.conviction_weights.validate()?;

        if self.max_position_size_pct <= Decimal::ZERO
            || self.max_position_size_pct > Decimal::ONE_HUNDRED
        {
            return Err(QuantError::Config(format!(
                "max_position_size_pct must be in (0, 100], got {}",
                self.max_position_size_pct
            )));
        }
        if self.max_total_loss_pct <= Decimal::ZERO
            || self.max_total_loss_pct > Decimal::ONE_HUNDRED
        {
            return Err(QuantError::Config(format!(
                "max_total_loss_pct must be in (0, 100], got {}",
                self.max_total_loss_pct
            )));
        }
        if self.warning_ratio <= Decimal::ZERO || self.warning_ratio >= Decimal::ONE {
            return Err(QuantError::Config(format!(
                "warning_ratio must be in (0, 1), got {}",
                self.warning_ratio
            )));
        }
        Ok(())
    }

    /// 경고 임계값 (%). 기본값: 한도 28%의 80% = 22.4%.
    pub fn warning_threshold_pct(&self) -> Decimal {
        self.max_total_loss_pct * self.warning_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = RiskConfig::default();
        config.conviction_weights.volume = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_warning_threshold() {
        let config = RiskConfig::default();
        assert_eq!(config.warning_threshold_pct(), dec!(22.4));
    }
}
