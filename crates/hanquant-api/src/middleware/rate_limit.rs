//! API rate limiting 미들웨어.
//!
//! 클라이언트 IP별 토큰 버킷으로 분당 요청 수를 제한합니다.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Rate limiter 설정.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// 분당 최대 요청 수
    pub requests_per_minute: u32,
    /// 버스트 허용량
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 600,
            burst_size: 50,
        }
    }
}

/// 클라이언트별 버킷 상태.
#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// IP별 토큰 버킷 rate limiter.
pub struct ApiRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

/// 핸들러 간 공유를 위한 타입.
pub type SharedRateLimiter = Arc<ApiRateLimiter>;

impl ApiRateLimiter {
    /// 새 rate limiter를 생성합니다.
    pub fn new(config: RateLimitConfig) -> SharedRateLimiter {
        Arc::new(Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    /// 요청 1건을 허용할지 판정합니다.
    pub async fn allow(&self, client: IpAddr) -> bool {
        let refill_per_sec = f64::from(self.config.requests_per_minute) / 60.0;
        let capacity = f64::from(self.config.requests_per_minute + self.config.burst_size);

        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.entry(client).or_insert_with(|| Bucket {
            tokens: capacity,
            last_refill: Instant::now(),
        });

        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(capacity);
        bucket.last_refill = Instant::now();

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rate limiting 미들웨어 함수.
pub async fn rate_limit(
    State(limiter): State<SharedRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));

    if !limiter.allow(client).await {
        metrics::counter!("http_rate_limited_total").increment(1);
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_limited() {
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst_size: 0,
        });
        let client = IpAddr::from([10, 0, 0, 1]);

        // 초기 버킷은 가득 차 있음
        for _ in 0..60 {
            assert!(limiter.allow(client).await);
        }
        assert!(!limiter.allow(client).await);
    }

    #[tokio::test]
    async fn test_clients_are_independent(){
        let limiter = ApiRateLimiter::new(RateLimitConfig {
            requests_per_minute: 1,
            burst_size: 0,
        });

        assert!(limiter.allow(IpAddr::from([10, 0, 0, 1])).await);
        assert!(limiter.allow(IpAddr::from([10, 0, 0, 2])).await);
        assert!(!limiter.allow(IpAddr::from([10, 0, 0, 1])).await);
    }
}
