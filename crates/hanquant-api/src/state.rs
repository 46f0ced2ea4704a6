//! 모든 핸들러에서 공유되는 애플리케이션 상태.

use crate::middleware::rate_limit::SharedRateLimiter;
use hanquant_core::AppConfig;
use hanquant_data::RedisPriceCache;
use hanquant_portfolio::PortfolioStore;
use hanquant_risk::{PositionSizer, RiskEngine};
use hanquant_signal::PositionMonitor;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
pub struct AppState {
    /// 포트폴리오 저장소
    pub store: Arc<dyn PortfolioStore>,
    /// 리스크 엔진 (서킷 브레이커, 매매 재개)
    pub risk_engine: Arc<RiskEngine>,
    /// 포지션 모니터
    pub monitor: Arc<PositionMonitor>,
    /// 포지션 사이저
    pub sizer: PositionSizer,
    /// 데이터베이스 연결 풀 (헬스 체크용)
    pub db_pool: Option<sqlx::PgPool>,
    /// Redis 캐시 (헬스 체크용)
    pub redis: Option<Arc<RedisPriceCache>>,
    /// Prometheus 메트릭 핸들
    pub prometheus: PrometheusHandle,
    /// API rate limiter
    pub rate_limiter: SharedRateLimiter,
    /// 로드된 설정
    pub config: AppConfig,
    /// 서버 시작 시각
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// API 버전
    pub version: String,
}

impl AppState {
    /// 데이터베이스 연결 상태를 확인합니다.
    pub async fn is_db_healthy(&self) -> bool {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            None => false,
        }
    }

    /// Redis 연결 상태를 확인합니다.
    pub async fn is_redis_healthy(&self) -> bool {
        match &self.redis {
            Some(cache) => cache.health_check().await.unwrap_or(false),
            None => false,
        }
    }
}
