//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템에서 사용합니다.
//! GET /health -> {status, service, version, checks{db, redis}}

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 헬스 체크 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 상태 ("healthy" | "degraded")
    pub status: String,
    /// 서비스 이름
    pub service: String,
    /// 버전
    pub version: String,
    /// 업타임 (초)
    pub uptime_secs: i64,
    /// 의존성별 상태
    pub checks: HealthChecks,
}

/// 의존성별 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthChecks {
    /// 데이터베이스 ("up" | "down" | "not_configured")
    pub db: String,
    /// Redis ("up" | "down" | "not_configured")
    pub redis: String,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db = if state.db_pool.is_none() {
        "not_configured".to_string()
    } else if state.is_db_healthy().await {
        "up".to_string()
    } else {
        "down".to_string()
    };
    let redis = if state.redis.is_none() {
        "not_configured".to_string()
    } else if state.is_redis_healthy().await {
        "up".to_string()
    } else {
        "down".to_string()
    };

    let degraded = db == "down" || redis == "down";
    let status_code = if degraded {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status: if degraded { "degraded" } else { "healthy" }.to_string(),
        service: "risk-manager".to_string(),
        version: state.version.clone(),
        uptime_secs: chrono::Utc::now()
            .signed_duration_since(state.started_at)
            .num_seconds(),
        checks: HealthChecks { db, redis },
    };

    (status_code, Json(response))
}
