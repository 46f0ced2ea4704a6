//! 종합 스코어 및 기술적 지표 스냅샷.
//!
//! 이 모듈은 스코어링 파이프라인의 읽기 전용 입력 타입을 정의합니다:
//! - `ScoreWeights` - 종합 점수 가중치 (합 1.0 검증)
//! - `CompositeScore` - (종목, 날짜)별 종합 점수
//! - `TechnicalSnapshot` - (종목, 날짜)별 파생 지표 값

use crate::error::{QuantError, QuantResult};
use crate::types::{Price, Ticker};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 가중치 합 검증 허용 오차.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// 종합 점수 가중치.
///
/// 네 개 서브 점수의 볼록 결합 계수이며 합은 1.0 ± 1e-6 이어야 합니다.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// 가치 점수 가중치
    pub value: f64,
    /// 성장 점수 가중치
    pub growth: f64,
    /// 퀄리티 점수 가중치
    pub quality: f64,
    /// 모멘텀 점수 가중치
    pub momentum: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            value: 0.25,
            growth: 0.25,
            quality: 0.25,
            momentum: 0.25,
        }
    }
}

impl ScoreWeights {
    /// 가중치 합이 1.0 ± 1e-6인지 검증합니다.
    pub fn validate(&self) -> QuantResult<()> {
        let sum = self.value + self.growth + self.quality + self.momentum;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(QuantError::Config(format!(
                "score weights must sum to 1.0, got {}",
                sum
            )));
        }
        if [self.value, self.growth, self.quality, self.momentum]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(QuantError::Config("score weights must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// (종목, 날짜)별 종합 점수.
///
/// 서브 점수와 종합 점수는 모두 [0, 100] 범위입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeScore {
    /// 종목코드
    pub ticker: Ticker,
    /// 산출 기준일
    pub score_date: NaiveDate,
    /// 가치 점수
    pub value_score: Decimal,
    /// 성장 점수
    pub growth_score: Decimal,
    /// 퀄리티 점수
    pub quality_score: Decimal,
    /// 모멘텀 점수
    pub momentum_score: Decimal,
    /// 종합 점수 (서브 점수의 볼록 결합)
    pub composite_score: Decimal,
    /// 백분위 순위 [0, 100]
    pub percentile: Decimal,
    /// 산출 타임스탬프
    pub computed_at: DateTime<Utc>,
}

impl CompositeScore {
    /// 주어진 가중치로 종합 점수가 서브 점수의 볼록 결합인지 확인합니다.
    ///
    /// 허용 오차는 1e-6 입니다.
    pub fn is_consistent(&self, weights: &ScoreWeights) -> bool {
        let expected = self.value_score.to_f64().unwrap_or(0.0) * weights.value
            + self.growth_score.to_f64().unwrap_or(0.0) * weights.growth
            + self.quality_score.to_f64().unwrap_or(0.0) * weights.quality
            + self.momentum_score.to_f64().unwrap_or(0.0) * weights.momentum;
        let actual = self.composite_score.to_f64().unwrap_or(f64::NAN);
        (expected - actual).abs() <= WEIGHT_SUM_TOLERANCE
    }

    /// 서브 점수와 가중치로부터 종합 점수를 계산합니다.
    pub fn combine(
        ticker: Ticker,
        score_date: NaiveDate,
        value: Decimal,
        growth: Decimal,
        quality: Decimal,
        momentum: Decimal,
        percentile: Decimal,
        weights: &ScoreWeights,
    ) -> QuantResult<Self> {
        weights.validate()?;

        let composite = value * Decimal::try_from(weights.value).unwrap_or_default()
            + growth * Decimal::try_from(weights.growth).unwrap_or_default()
            + quality * Decimal::try_from(weights.quality).unwrap_or_default()
            + momentum * Decimal::try_from(weights.momentum).unwrap_or_default();

        Ok(Self {
            ticker,
            score_date,
            value_score: value,
            growth_score: growth,
            quality_score: quality,
            momentum_score: momentum,
            composite_score: composite,
            percentile,
            computed_at: Utc::now(),
        })
    }
}

/// (종목, 날짜)별 기술적 지표 스냅샷.
///
/// 지표 계산 자체는 외부 협력자의 책임이며, 여기서는 최신 값만 읽습니다.
/// 오실레이터 계열은 f64, 가격 수준 계열은 Decimal로 유지합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    /// 종목코드
    pub ticker: Option<Ticker>,
    /// 산출 기준일
    pub snapshot_date: Option<NaiveDate>,
    /// RSI(14)
    pub rsi_14: Option<f64>,
    /// MACD 라인
    pub macd: Option<f64>,
    /// MACD 시그널 라인
    pub macd_signal: Option<f64>,
    /// 볼린저 밴드 상단
    pub bb_upper: Option<Price>,
    /// 볼린저 밴드 하단
    pub bb_lower: Option<Price>,
    /// 20일 단순이동평균
    pub sma_20: Option<Price>,
    /// ATR(14)
    pub atr_14: Option<Decimal>,
    /// 20일 평균 거래량
    pub volume_ma_20: Option<Decimal>,
    /// 당일 거래량
    pub current_volume: Option<Decimal>,
    /// 30일 연환산 변동성 (비율, 예: 0.35 = 35%)
    pub annualized_volatility: Option<f64>,
}

impl TechnicalSnapshot {
    /// 입력 필드 중 비어 있지 않은 비율에서 데이터 품질 점수를 계산합니다.
    ///
    /// 반환 범위는 [0, 100]입니다.
    pub fn data_quality_score(&self) -> Decimal {
        let fields: [bool; 9] = [
            self.rsi_14.is_some(),
            self.macd.is_some(),
            self.macd_signal.is_some(),
            self.bb_upper.is_some(),
            self.bb_lower.is_some(),
            self.sma_20.is_some(),
            self.atr_14.is_some(),
            self.volume_ma_20.is_some(),
            self.current_volume.is_some(),
        ];
        let present = fields.iter().filter(|p| **p).count() as i64;
        Decimal::from(present * 100) / Decimal::from(fields.len() as i64)
    }

    /// 거래량 / 20일 평균 거래량 비율. 평균이 없거나 0이면 None.
    pub fn volume_ratio(&self) -> Option<Decimal> {
        let ma = self.volume_ma_20?;
        if ma.is_zero() {
            return None;
        }
        Some(self.current_volume? / ma)
    }

    /// MACD 데드크로스 여부 (MACD 라인이 시그널 라인 아래).
    pub fn macd_bearish(&self) -> bool {
        match (self.macd, self.macd_signal) {
            (Some(macd), Some(signal)) => macd < signal,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_weights_must_sum_to_one() {
        let ok = ScoreWeights::default();
        assert!(ok.validate().is_ok());

        let bad = ScoreWeights {
            value: 0.5,
            growth: 0.5,
            quality: 0.5,
            momentum: 0.5,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_weights_tolerance() {
        let nearly = ScoreWeights {
            value: 0.3,
            growth: 0.2,
            quality: 0.2,
            momentum: 0.3000000005,
        };
        assert!(nearly.validate().is_ok());
    }

    #[test]
    fn test_composite_is_convex_combination() {
        let ticker = Ticker::new("005930").unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let score = CompositeScore::combine(
            ticker,
            date,
            dec!(80),
            dec!(60),
            dec!(70),
            dec!(90),
            dec!(95),
            &ScoreWeights::default(),
        )
        .unwrap();

        assert_eq!(score.composite_score, dec!(75));
        assert!(score.is_consistent(&ScoreWeights::default()));
    }

    #[test]
    fn test_data_quality_score() {
        let empty = TechnicalSnapshot::default();
        assert_eq!(empty.data_quality_score(), Decimal::ZERO);

        let full = TechnicalSnapshot {
            rsi_14: Some(55.0),
            macd: Some(120.0),
            macd_signal: Some(110.0),
            bb_upper: Some(dec!(72000)),
            bb_lower: Some(dec!(66000)),
            sma_20: Some(dec!(69000)),
            atr_14: Some(dec!(1500)),
            volume_ma_20: Some(dec!(12_000_000)),
            current_volume: Some(dec!(18_000_000)),
            ..Default::default()
        };
        assert_eq!(full.data_quality_score(), dec!(100));
        assert_eq!(full.volume_ratio(), Some(dec!(1.5)));
        assert!(!full.macd_bearish());
    }
}
