//! 오케스트레이터 본체.
//!
//! 제어 루프는 단일 태스크입니다. 작업 실행만 태스크로 분리되며
//! `max_instances = 1` 규칙에 따라 작업당 동시 실행은 1개입니다.
//!
//! 발사 판정(`poll`)은 시계 주입으로 순수하게 테스트할 수 있습니다.

use crate::clock::Clock;
use crate::job::{JobSpec, JobStats};
use chrono::{DateTime, Utc};
use hanquant_core::KrxCalendar;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// poll 1회의 발사 판정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireDecision {
    /// 실행
    Run {
        /// 작업 이름
        job: String,
        /// 예정되어 있던 발사 시각
        scheduled_at: DateTime<Utc>,
    },
    /// 유예 초과로 버림
    Dropped {
        /// 작업 이름
        job: String,
        /// 예정되어 있던 발사 시각
        scheduled_at: DateTime<Utc>,
    },
    /// 실행 중이라 억제
    Suppressed {
        /// 작업 이름
        job: String,
    },
}

struct JobState {
    spec: JobSpec,
    next_fire: DateTime<Utc>,
    running: Arc<AtomicBool>,
    stats: JobStats,
}

/// 오케스트레이터.
pub struct Orchestrator {
    jobs: Vec<JobState>,
    calendar: Arc<KrxCalendar>,
    clock: Arc<dyn Clock>,
    shutdown_deadline: std::time::Duration,
}

impl Orchestrator {
    /// 새 오케스트레이터를 생성합니다.
    pub fn new(
        calendar: Arc<KrxCalendar>,
        clock: Arc<dyn Clock>,
        shutdown_deadline: std::time::Duration,
    ) -> Self {
        Self {
            jobs: Vec::new(),
            calendar,
            clock,
            shutdown_deadline,
        }
    }

    /// 작업을 등록합니다. 첫 발사 시각은 현재 시각 기준으로 계산됩니다.
    pub fn register(&mut self, spec: JobSpec) {
        let now = self.clock.now();
        let next_fire = spec.trigger.next_fire(now, &self.calendar);
        info!(job = %spec.name, %next_fire, "job registered");
        self.jobs.push(JobState {
            spec,
            next_fire,
            running: Arc::new(AtomicBool::new(false)),
            stats: JobStats::default(),
        });
    }

    /// 작업별 다음 발사 시각을 반환합니다.
    pub fn next_fires(&self) -> HashMap<String, DateTime<Utc>> {
        self.jobs
            .iter()
            .map(|j| (j.spec.name.clone(), j.next_fire))
            .collect()
    }

    /// 작업별 실행 통계를 반환합니다.
    pub fn job_stats(&self) -> HashMap<String, JobStats> {
        self.jobs
            .iter()
            .map(|j| (j.spec.name.clone(), j.stats))
            .collect()
    }

    /// 가장 이른 다음 발사 시각.
    fn earliest_fire(&self) -> Option<DateTime<Utc>> {
        self.jobs.iter().map(|j| j.next_fire).min()
    }

    /// 현재 시각 기준으로 만기된 작업의 발사를 판정합니다.
    ///
    /// coalesce 규칙: 다음 발사 시각은 (이전 발사 시각이 아니라) 현재
    /// 시각 이후로 재계산하므로, 중단 중 쌓인 발사는 최대 1회로
    /// 합쳐집니다.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Vec<FireDecision> {
        let mut decisions = Vec::new();

        for job in self.jobs.iter_mut() {
            if job.next_fire > now {
                continue;
            }
            let scheduled_at = job.next_fire;
            job.next_fire = job.spec.trigger.next_fire(now, &self.calendar);

            if now - scheduled_at > job.spec.grace_period {
                warn!(
                    job = %job.spec.name,
                    %scheduled_at,
                    "firing missed beyond grace period, dropped"
                );
                job.stats.dropped += 1;
                decisions.push(FireDecision::Dropped {
                    job: job.spec.name.clone(),
                    scheduled_at,
                });
                continue;
            }
            if job.running.load(Ordering::SeqCst) {
                job.stats.suppressed += 1;
                decisions.push(FireDecision::Suppressed {
                    job: job.spec.name.clone(),
                });
                continue;
            }

            job.stats.runs += 1;
            decisions.push(FireDecision::Run {
                job: job.spec.name.clone(),
                scheduled_at,
            });
        }
        decisions
    }

    /// 제어 루프를 실행합니다. 종료 신호가 오면 새 발사를 멈추고
    /// 인플라이트 작업을 기한 안에서 기다린 뒤 강제 취소합니다.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut workers: JoinSet<()> = JoinSet::new();
        let job_cancel = CancellationToken::new();

        info!(jobs = self.jobs.len(), "orchestrator started");

        loop {
            let Some(earliest) = self.earliest_fire() else {
                warn!("no jobs registered, orchestrator idle until shutdown");
                shutdown.cancelled().await;
                break;
            };

            let now = self.clock.now();
            let wait = (earliest - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let now = self.clock.now();
            for decision in self.poll(now) {
                if let FireDecision::Run { job, .. } = decision {
                    self.spawn_job(&job, &mut workers, &job_cancel);
                }
            }
        }

        // 종료: 새 발사 중단 -> 기한 내 대기 -> 강제 취소
        info!(
            in_flight = workers.len(),
            deadline_secs = self.shutdown_deadline.as_secs(),
            "shutdown requested, draining in-flight jobs"
        );
        let drained = tokio::time::timeout(self.shutdown_deadline, async {
            while workers.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!("shutdown deadline exceeded, cancelling remaining jobs");
            job_cancel.cancel();
            workers.shutdown().await;
        }
        info!("orchestrator stopped");
    }

    fn spawn_job(
        &self,
        name: &str,
        workers: &mut JoinSet<()>,
        job_cancel: &CancellationToken,
    ) {
        let Some(job) = self.jobs.iter().find(|j| j.spec.name == name) else {
            return;
        };
        let stage = job.spec.stage.clone();
        let running = job.running.clone();
        let job_name = job.spec.name.clone();
        let cancel = job_cancel.child_token();

        running.store(true, Ordering::SeqCst);
        workers.spawn(async move {
            info!(job = %job_name, "job started");
            match stage.run(cancel).await {
                Ok(stats) => stats.log_summary(&job_name),
                // 작업 실패는 해당 작업에 국한됨
                Err(e) => error!(job = %job_name, error = %e, "job failed"),
            }
            running.store(false, Ordering::SeqCst);
        });
    }
}
