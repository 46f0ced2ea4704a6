//! 포지션 사이징 계산 endpoint.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use hanquant_risk::{HistoricalStats, Sizing, SizingInput, SizingMethod};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

/// 사이징 계산 요청.
#[derive(Debug, Deserialize)]
pub struct SizingRequest {
    /// 포트폴리오 총 평가 금액
    pub portfolio_value: Decimal,
    /// 가용 현금 (생략 시 포트폴리오 전액)
    pub available_cash: Option<Decimal>,
    /// 진입 가격
    pub entry_price: Decimal,
    /// 손절 가격
    pub stop_loss_price: Decimal,
    /// 컨빅션 점수 [0, 100]
    pub conviction: Decimal,
    /// 사이징 방법 (생략 시 설정값)
    pub method: Option<SizingMethod>,
    /// Kelly/변동성 계산용 과거 통계
    pub stats: Option<HistoricalStats>,
}

/// POST /position-size/calculate
pub async fn calculate_position_size(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SizingRequest>,
) -> Result<Json<Sizing>, ApiError> {
    let input = SizingInput {
        portfolio_value: request.portfolio_value,
        available_cash: request.available_cash.unwrap_or(request.portfolio_value),
        entry_price: request.entry_price,
        stop_loss_price: request.stop_loss_price,
        conviction: request.conviction,
        stats: request.stats,
    };

    let sizing = match request.method {
        Some(method) => state.sizer.recommend_with(method, &input)?,
        None => state.sizer.recommend(&input)?,
    };
    Ok(Json(sizing))
}
