//! Prometheus 메트릭 endpoint.
//!
//! GET /metrics -> Prometheus 텍스트 형식

use crate::state::AppState;
use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Prometheus 레코더를 설치하고 핸들을 반환합니다.
///
/// # 패닉
///
/// 레코더가 이미 설치되어 있으면 패닉합니다 (프로세스당 1회 호출).
pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// GET /metrics
pub async fn render_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus.render()
}
