//! 지수 백오프 재시도.
//!
//! 외부 호출 실패는 3회까지 재시도합니다 (기본 1초, 배수 2, 지터 ±20%).
//! 소진되면 호출자가 해당 종목/틱을 `skipped`로 기록하고 계속 진행합니다.

use hanquant_core::QuantError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// 재시도 정책.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 기본 대기 시간
    pub base_delay: Duration,
    /// 대기 시간 배수
    pub factor: f64,
    /// 지터 비율 (0.2 = ±20%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// n번째 시도(0부터) 후 대기 시간을 계산합니다.
    fn delay_for(&self, attempt: u32, rng: &mut StdRng) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.factor.powi(attempt as i32);
        let jitter = rng.gen_range(-self.jitter..=self.jitter);
        Duration::from_secs_f64((base * (1.0 + jitter)).max(0.0))
    }
}

/// 재시도 가능한 에러에 한해 지수 백오프로 재시도합니다.
///
/// 재시도 불가능한 에러는 즉시 반환합니다.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, QuantError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QuantError>>,
{
    let mut rng = StdRng::from_entropy();
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt, &mut rng);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error
        .unwrap_or_else(|| QuantError::Internal(format!("{}: retries exhausted", operation_name))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let result = retry_with_backoff(&policy, "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(QuantError::Transient("503".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<(), _> = retry_with_backoff(&policy, "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(QuantError::Validation("bad ticker".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };

        let result: Result<(), _> = retry_with_backoff(&policy, "test", || async {
            Err(QuantError::Transient("timeout".to_string()))
        })
        .await;

        assert!(matches!(result, Err(QuantError::Transient(_))));
    }
}
