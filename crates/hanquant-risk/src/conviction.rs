//! 컨빅션 스코어러.
//!
//! 종합 점수의 가치/모멘텀/퀄리티 서브 점수에 거래량 요소를 더해
//! [0, 100] 컨빅션 점수를 만듭니다. 거래량 요소는 (당일 거래량 / 20일
//! 평균 거래량) 비율을 구간 매핑합니다:
//!
//! - 1.5배 이상 -> 100
//! - 1.0~1.5배 -> 50~100 선형
//! - 0.5~1.0배 -> 0~50 선형
//! - 0.5배 미만 -> 0

use crate::config::ConvictionWeights;
use hanquant_core::{CompositeScore, QuantResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// 컨빅션 요소별 점수.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConvictionComponents {
    /// 가치 요소 [0, 100]
    pub value: Decimal,
    /// 모멘텀 요소 [0, 100]
    pub momentum: Decimal,
    /// 거래량 요소 [0, 100]
    pub volume: Decimal,
    /// 퀄리티 요소 [0, 100]
    pub quality: Decimal,
}

/// 컨빅션 평가 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conviction {
    /// 가중 결합된 총점 [0, 100]
    pub score: Decimal,
    /// 요소별 점수
    pub components: ConvictionComponents,
    /// 임계값 기반 텍스트 근거
    pub reasons: Vec<String>,
}

/// 컨빅션 스코어러.
#[derive(Debug, Clone)]
pub struct ConvictionScorer {
    weights: ConvictionWeights,
}

impl ConvictionScorer {
    /// 검증된 가중치로 스코어러를 생성합니다.
    pub fn new(weights: ConvictionWeights) -> QuantResult<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// 거래량 비율을 [0, 100] 요소 점수로 매핑합니다.
    pub fn volume_component(volume_ratio: Option<Decimal>) -> Decimal {
        let Some(ratio) = volume_ratio else {
            return Decimal::ZERO;
        };
        if ratio >= dec!(1.5) {
            Decimal::ONE_HUNDRED
        } else if ratio >= Decimal::ONE {
            dec!(50) + (ratio - Decimal::ONE) / dec!(0.5) * dec!(50)
        } else if ratio >= dec!(0.5) {
            (ratio - dec!(0.5)) / dec!(0.5) * dec!(50)
        } else {
            Decimal::ZERO
        }
    }

    /// 종합 점수와 거래량 비율에서 컨빅션을 평가합니다.
    pub fn score(&self, composite: &CompositeScore, volume_ratio: Option<Decimal>) -> Conviction {
        let components = ConvictionComponents {
            value: composite.value_score,
            momentum: composite.momentum_score,
            volume: Self::volume_component(volume_ratio),
            quality: composite.quality_score,
        };

        let score = components.value * decimal_weight(self.weights.value)
            + components.momentum * decimal_weight(self.weights.momentum)
            + components.volume * decimal_weight(self.weights.volume)
            + components.quality * decimal_weight(self.weights.quality);

        let mut reasons = Vec::new();
        if components.value >= dec!(70) {
            reasons.push("Strong value opportunity".to_string());
        }
        if components.momentum >= dec!(70) {
            reasons.push("Strong momentum".to_string());
        }
        if components.volume >= dec!(80) {
            reasons.push("Volume surge confirms interest".to_string());
        }
        if components.quality >= dec!(70) {
            reasons.push("High quality fundamentals".to_string());
        }

        Conviction {
            score,
            components,
            reasons,
        }
    }
}

fn decimal_weight(w: f64) -> Decimal {
    Decimal::try_from(w).unwrap_or(Decimal::ZERO)
}
