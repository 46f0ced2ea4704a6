//! 포지션 사이저.
//!
//! 5가지 사이징 정책(고정 비율, 고정 리스크, 변동성 조정, Kelly
//! 전액/절반/1/4)을 제공합니다. 모든 결과는 단일 포지션 상한과 가용
//! 현금으로 제한되며, 수량은 정수로 내림합니다 (KRX는 소수 주식 없음).
//!
//! 컨빅션 스케일링: 최종 비중에 clamp((컨빅션-60)/40, 0, 1)을 곱합니다.
//! 컨빅션 60 미만이면 방법과 무관하게 수량 0입니다.

use crate::config::{RiskConfig, SizingMethod};
use hanquant_core::{pct_of, DecimalExt, Percentage, Price, QuantError, QuantResult, Shares};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Kelly/변동성 계산에 필요한 과거 통계.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalStats {
    /// 승률 (0.0 ~ 1.0)
    pub win_rate: f64,
    /// 평균 수익 금액
    pub avg_win: Decimal,
    /// 평균 손실 금액 (양수)
    pub avg_loss: Decimal,
    /// 30일 연환산 변동성 (비율)
    pub annualized_volatility: Option<f64>,
    /// 유니버스 중앙값 변동성 (비율)
    pub median_volatility: Option<f64>,
}

/// 사이징 입력.
#[derive(Debug, Clone)]
pub struct SizingInput {
    /// 포트폴리오 총 평가 금액
    pub portfolio_value: Decimal,
    /// 가용 현금
    pub available_cash: Decimal,
    /// 진입 가격
    pub entry_price: Price,
    /// 손절 가격
    pub stop_loss_price: Price,
    /// 컨빅션 점수 [0, 100]
    pub conviction: Decimal,
    /// 과거 통계 (Kelly/변동성 조정용)
    pub stats: Option<HistoricalStats>,
}

/// 사이징 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sizing {
    /// 권장 수량 (정수)
    pub recommended_shares: Shares,
    /// 포지션 금액 (수량 * 진입가)
    pub position_value: Decimal,
    /// 포트폴리오 대비 비중 (%)
    pub position_pct: Percentage,
    /// 계산 메모
    pub notes: Vec<String>,
}

impl Sizing {
    fn zero(note: impl Into<String>) -> Self {
        Self {
            recommended_shares: 0,
            position_value: Decimal::ZERO,
            position_pct: Decimal::ZERO,
            notes: vec![note.into()],
        }
    }
}

/// 포지션 사이저.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    config: RiskConfig,
}

impl PositionSizer {
    /// 검증된 설정으로 사이저를 생성합니다.
    pub fn new(config: RiskConfig) -> QuantResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 설정 참조를 반환합니다.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// 설정된 방법으로 포지션 크기를 계산합니다.
    pub fn recommend(&self, input: &SizingInput) -> QuantResult<Sizing> {
        self.recommend_with(self.config.sizing_method, input)
    }

    /// 지정한 방법으로 포지션 크기를 계산합니다.
    pub fn recommend_with(&self, method: SizingMethod, input: &SizingInput) -> QuantResult<Sizing> {
        if input.entry_price <= Decimal::ZERO {
            return Err(QuantError::Validation(format!(
                "entry price must be positive, got {}",
                input.entry_price
            )));
        }
        if input.stop_loss_price >= input.entry_price {
            return Err(QuantError::Validation(format!(
                "stop loss {} must be below entry {}",
                input.stop_loss_price, input.entry_price
            )));
        }

        // 컨빅션 미달은 방법과 무관하게 수량 0
        if input.conviction < self.config.min_conviction_score {
            return Ok(Sizing::zero(format!(
                "conviction {} below minimum {}",
                input.conviction, self.config.min_conviction_score
            )));
        }

        let mut notes = Vec::new();
        let raw_value = match method {
            SizingMethod::FixedPercent => {
                pct_of(input.portfolio_value, self.config.max_position_size_pct)
            }
            SizingMethod::FixedRisk => self.fixed_risk_value(input, &mut notes),
            SizingMethod::VolatilityAdjusted => self.volatility_value(input, &mut notes),
            SizingMethod::KellyFull => self.kelly_value(input, Decimal::ONE, &mut notes),
            SizingMethod::KellyHalf => self.kelly_value(input, dec!(0.5), &mut notes),
            SizingMethod::KellyQuarter => self.kelly_value(input, dec!(0.25), &mut notes),
        };

        // 컨빅션 스케일링: 60 -> 0%, 100 -> 100%
        let scale = ((input.conviction - self.config.min_conviction_score)
            / (Decimal::ONE_HUNDRED - self.config.min_conviction_score))
            .clamp(Decimal::ZERO, Decimal::ONE);
        let scaled_value = raw_value * scale;
        if scale < Decimal::ONE {
            notes.push(format!("conviction scaling applied: {}", scale.round_pct()));
        }

        // 단일 포지션 상한과 가용 현금으로 제한
        let cap = pct_of(input.portfolio_value, self.config.max_position_size_pct);
        let mut capped_value = scaled_value.min(cap);
        if capped_value < scaled_value {
            notes.push(format!(
                "capped at {}% of portfolio",
                self.config.max_position_size_pct
            ));
        }
        if capped_value > input.available_cash {
            capped_value = input.available_cash;
            notes.push("capped by available cash".to_string());
        }

        let shares = (capped_value / input.entry_price)
            .floor()
            .to_i64()
            .unwrap_or(0)
            .max(0);
        if shares == 0 {
            return Ok(Sizing::zero("computed size rounds down to zero shares"));
        }

        let position_value = input.entry_price * Decimal::from(shares);
        let position_pct = if input.portfolio_value.is_zero() {
            Decimal::ZERO
        } else {
            (position_value / input.portfolio_value * Decimal::ONE_HUNDRED).round_pct()
        };

        Ok(Sizing {
            recommended_shares: shares,
            position_value,
            position_pct,
            notes,
        })
    }

    /// 고정 리스크: 리스크 금액 / 주당 리스크 만큼의 수량.
    fn fixed_risk_value(&self, input: &SizingInput, notes: &mut Vec<String>) -> Decimal {
        let risk_amount = pct_of(input.portfolio_value, self.config.risk_tolerance_pct);
        let per_share_risk = input.entry_price - input.stop_loss_price;
        let shares = (risk_amount / per_share_risk).floor();
        notes.push(format!(
            "risk {} / per-share risk {} = {} shares before caps",
            risk_amount, per_share_risk, shares
        ));
        shares * input.entry_price
    }

    /// 변동성 조정: 중앙값 변동성 종목이 상한 비중을 받도록 역비례 배분.
    fn volatility_value(&self, input: &SizingInput, notes: &mut Vec<String>) -> Decimal {
        let (vol, median) = match input.stats.as_ref().and_then(|s| {
            Some((s.annualized_volatility?, s.median_volatility?))
        }) {
            Some(pair) if pair.0 > 0.0 => pair,
            _ => {
                notes.push("volatility unavailable, falling back to fixed percent".to_string());
                return pct_of(input.portfolio_value, self.config.max_position_size_pct);
            }
        };

        let ratio = Decimal::try_from(median / vol).unwrap_or(Decimal::ONE);
        let pct = (self.config.max_position_size_pct * ratio)
            .min(self.config.max_position_size_pct);
        pct_of(input.portfolio_value, pct)
    }

    /// Kelly 기준: f* = p - (1-p)/b, b = 평균수익/평균손실.
    fn kelly_value(
        &self,
        input: &SizingInput,
        fraction: Decimal,
        notes: &mut Vec<String>,
    ) -> Decimal {
        let Some(stats) = input.stats.as_ref() else {
            notes.push("no historical stats, kelly size is zero".to_string());
            return Decimal::ZERO;
        };
        if stats.avg_loss <= Decimal::ZERO || stats.win_rate <= 0.0 || stats.win_rate >= 1.0 {
            notes.push("degenerate kelly inputs, size is zero".to_string());
            return Decimal::ZERO;
        }

        let b = (stats.avg_win / stats.avg_loss).to_f64().unwrap_or(0.0);
        if b <= 0.0 {
            notes.push("non-positive win/loss ratio, size is zero".to_string());
            return Decimal::ZERO;
        }

        let kelly = stats.win_rate - (1.0 - stats.win_rate) / b;
        if kelly <= 0.0 {
            notes.push(format!("negative kelly fraction {:.4}, size is zero", kelly));
            return Decimal::ZERO;
        }

        let kelly_pct = (Decimal::try_from(kelly * 100.0).unwrap_or(Decimal::ZERO) * fraction)
            .min(self.config.max_position_size_pct);
        notes.push(format!("kelly fraction {:.4}, applied {}", kelly, fraction));
        pct_of(input.portfolio_value, kelly_pct)
    }
}
