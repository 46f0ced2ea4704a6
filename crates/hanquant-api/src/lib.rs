//! # HanQuant API
//!
//! 리스크 매니저 HTTP 서비스입니다. 모든 서비스가 공유하는 표준 표면
//! (`GET /health`, `GET /metrics`)과 도메인 엔드포인트(포트폴리오
//! 모니터링, 포지션 한도, 사이징 계산, 매매 허용 조회/재개)를
//! 제공합니다.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::*;
pub use state::*;

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

/// 전체 라우터를 구성합니다.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::render_metrics))
        .route(
            "/portfolio/{user}/monitor",
            post(routes::portfolio::run_monitor),
        )
        .route(
            "/portfolio/{user}/positions/{ticker}/limits",
            put(routes::portfolio::update_limits),
        )
        .route(
            "/portfolio/{user}/is-trading-allowed",
            get(routes::portfolio::is_trading_allowed),
        )
        .route(
            "/portfolio/{user}/resume-trading",
            post(routes::portfolio::resume_trading),
        )
        .route(
            "/portfolio/{user}/risk-check",
            post(routes::portfolio::run_risk_check),
        )
        .route(
            "/position-size/calculate",
            post(routes::sizing::calculate_position_size),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
