//! 작업 정의.

use crate::stats::StageStats;
use crate::trigger::Trigger;
use async_trait::async_trait;
use chrono::Duration;
use hanquant_core::QuantResult;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 파이프라인 단계.
///
/// 각 단계는 감독 경계입니다: 단계 내부의 실패는 로깅 후 해당 단계에
/// 국한되며 오케스트레이터는 다음 발사를 계속합니다. 취소 토큰은 종목/
/// 포지션 단위의 안전 지점마다 확인해야 합니다.
#[async_trait]
pub trait Stage: Send + Sync {
    /// 단계를 1회 실행합니다.
    async fn run(&self, cancel: CancellationToken) -> QuantResult<StageStats>;
}

/// 작업 명세.
#[derive(Clone)]
pub struct JobSpec {
    /// 작업 이름
    pub name: String,
    /// 트리거
    pub trigger: Trigger,
    /// 놓친 발사를 허용하는 유예 기간
    pub grace_period: Duration,
    /// 실행할 단계
    pub stage: Arc<dyn Stage>,
}

impl JobSpec {
    /// 기본 유예 기간(5분)으로 작업을 생성합니다.
    pub fn new(name: impl Into<String>, trigger: Trigger, stage: Arc<dyn Stage>) -> Self {
        Self {
            name: name.into(),
            trigger,
            grace_period: Duration::minutes(5),
            stage,
        }
    }

    /// 유예 기간을 설정합니다.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

/// 작업 실행 통계.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobStats {
    /// 실행 횟수
    pub runs: usize,
    /// 실패 횟수
    pub failures: usize,
    /// 유예 초과로 버린 발사 횟수
    pub dropped: usize,
    /// 실행 중이라 억제된 발사 횟수
    pub suppressed: usize,
}
