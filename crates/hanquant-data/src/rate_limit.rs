//! 외부 API 호출용 토큰 버킷.
//!
//! 엔드포인트별 프로세스 전역 토큰 버킷입니다. 데이터 수집은 기본
//! 1 rps, 펀더멘털은 0.5 rps로 제한합니다.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 토큰 버킷 상태.
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// 토큰 버킷 rate limiter.
pub struct TokenBucket {
    /// 버킷 용량 (버스트 허용량)
    capacity: f64,
    /// 초당 토큰 충전량
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// 새 토큰 버킷을 생성합니다.
    ///
    /// # 인자
    /// * `capacity` - 버킷 용량 (순간 버스트 한도)
    /// * `refill_per_sec` - 초당 충전되는 토큰 수 (지속 처리율)
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// 초당 요청 수 기준의 버킷을 생성합니다 (용량 1).
    pub fn per_second(rps: f64) -> Self {
        Self::new(1.0, rps)
    }

    /// 토큰 1개를 소비합니다. 토큰이 없으면 충전될 때까지 대기합니다.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let elapsed = state.last_refill.elapsed().as_secs_f64();
                state.tokens =
                    (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
                state.last_refill = Instant::now();

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// 토큰 1개 소비를 시도합니다. 토큰이 없으면 즉시 false를 반환합니다.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_empty() {
        let bucket = TokenBucket::new(2.0, 1.0);
        assert!(bucket.try_acquire().await);
        assert!(bucket.try_acquire().await);
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::per_second(20.0);
        bucket.acquire().await;
        // 두 번째 acquire는 최대 50ms 안에 충전되어야 함
        let start = Instant::now();
        bucket.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
