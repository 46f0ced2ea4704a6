//! 포트폴리오/리스크 도메인 endpoint.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use hanquant_core::{PositionLimits, QuantError, Ticker, TradingSignal};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 모니터 틱 응답.
#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    /// 이번 틱에서 생성된 청산 시그널
    pub exit_signals: Vec<TradingSignal>,
}

/// POST /portfolio/{user}/monitor
///
/// 모니터 틱 1회를 실행하고 청산 시그널을 반환합니다.
pub async fn run_monitor(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<MonitorResponse>, ApiError> {
    let exit_signals = state.monitor.tick(&user).await?;
    Ok(Json(MonitorResponse { exit_signals }))
}

/// 포지션 한도 갱신 요청.
#[derive(Debug, Deserialize)]
pub struct UpdateLimitsRequest {
    /// 손절 비율 (%)
    pub stop_loss_pct: Decimal,
    /// 익절 비율 (%)
    pub take_profit_pct: Decimal,
    /// 트레일링 스톱 사용 여부
    pub trailing_enabled: bool,
    /// 트레일링 거리 (%)
    pub trailing_distance_pct: Decimal,
}

/// PUT /portfolio/{user}/positions/{ticker}/limits
pub async fn update_limits(
    State(state): State<Arc<AppState>>,
    Path((user, ticker)): Path<(String, String)>,
    Json(request): Json<UpdateLimitsRequest>,
) -> Result<Json<hanquant_core::Position>, ApiError> {
    if request.stop_loss_pct <= Decimal::ZERO || request.take_profit_pct <= Decimal::ZERO {
        return Err(ApiError(QuantError::Validation(
            "stop/take profit percentages must be positive".to_string(),
        )));
    }

    let ticker = Ticker::new(&ticker)?;
    let limits = PositionLimits {
        stop_loss_pct: request.stop_loss_pct,
        take_profit_pct: request.take_profit_pct,
        trailing_enabled: request.trailing_enabled,
        trailing_distance_pct: request.trailing_distance_pct,
    };
    let position = state
        .store
        .initialize_limits(&user, &ticker, &limits, None)
        .await?;
    Ok(Json(position))
}

/// 매매 허용 여부 응답.
#[derive(Debug, Serialize)]
pub struct TradingAllowedResponse {
    /// 신규 매수 허용 여부
    pub allowed: bool,
    /// 정지 사유 (정지 중일 때)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
}

/// GET /portfolio/{user}/is-trading-allowed
pub async fn is_trading_allowed(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<TradingAllowedResponse>, ApiError> {
    let metrics = state.store.metrics(&user).await?;
    Ok(Json(TradingAllowedResponse {
        allowed: !metrics.trading_halted,
        halt_reason: metrics.halt_reason,
    }))
}

/// POST /portfolio/{user}/resume-trading
///
/// 매매 정지를 해제합니다. 서킷 브레이커는 운영자의 명시적 액션으로만
/// 해제됩니다.
pub async fn resume_trading(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<TradingAllowedResponse>, ApiError> {
    state.risk_engine.resume_trading(&user).await?;
    Ok(Json(TradingAllowedResponse {
        allowed: true,
        halt_reason: None,
    }))
}

/// 리스크 점검 응답.
#[derive(Debug, Serialize)]
pub struct RiskCheckResponse {
    /// 갱신된 지표
    pub metrics: hanquant_core::PortfolioMetrics,
    /// 서킷 브레이커 발동 여부
    pub tripped: bool,
    /// 경고
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// 비상 청산 시그널 수
    pub liquidation_signal_count: usize,
}

/// POST /portfolio/{user}/risk-check
pub async fn run_risk_check(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<RiskCheckResponse>, ApiError> {
    let report = state.risk_engine.run_check(&user).await?;
    Ok(Json(RiskCheckResponse {
        metrics: report.metrics,
        tripped: report.tripped,
        warning: report.warning,
        liquidation_signal_count: report.liquidation_signals.len(),
    }))
}
