//! 단계 실행 통계.

use serde::{Deserialize, Serialize};

/// 파이프라인 단계 1회 실행의 통계.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageStats {
    /// 처리 대상 수
    pub processed: usize,
    /// 성공 수
    pub succeeded: usize,
    /// 건너뛴 수 (오래된 데이터, 재시도 소진 등)
    pub skipped: usize,
    /// 실패 수
    pub failed: usize,
}

impl StageStats {
    /// 성공 1건을 기록합니다.
    pub fn success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    /// 건너뜀 1건을 기록합니다.
    pub fn skip(&mut self) {
        self.processed += 1;
        self.skipped += 1;
    }

    /// 실패 1건을 기록합니다.
    pub fn fail(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    /// 요약 로그를 남깁니다.
    pub fn log_summary(&self, label: &str) {
        tracing::info!(
            processed = self.processed,
            succeeded = self.succeeded,
            skipped = self.skipped,
            failed = self.failed,
            "{} 완료",
            label
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let mut stats = StageStats::default();
        stats.success();
        stats.success();
        stats.skip();
        stats.fail();

        assert_eq!(stats.processed, 4);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }
}
