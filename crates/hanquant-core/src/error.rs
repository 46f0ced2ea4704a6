//! 트레이딩 시스템의 에러 타입.
//!
//! 이 모듈은 시스템 전반에서 사용되는 에러 분류를 정의합니다.
//! 분류별 처리 정책은 호출자가 `is_retryable` / `is_fatal`로 판단합니다.

use thiserror::Error;

/// 핵심 트레이딩 에러.
#[derive(Debug, Error)]
pub enum QuantError {
    /// 설정 에러 (기동 시 치명적)
    #[error("설정 에러: {0}")]
    Config(String),

    /// 외부 데이터 소스의 일시적 장애 (재시도 대상)
    #[error("데이터 소스 에러: {0}")]
    Transient(String),

    /// 데이터 품질 문제 (오래된 스코어, 누락 지표 등)
    #[error("데이터 품질 에러: {0}")]
    DataQuality(String),

    /// 경계 검증 실패 (잘못된 종목코드, 음수 수량 등)
    #[error("검증 에러: {0}")]
    Validation(String),

    /// 비즈니스 규칙 위반 (현금 부족, 포지션 한도, 매매 정지 등)
    #[error("비즈니스 규칙 위반: {0}")]
    Business(String),

    /// 불변 조건 위반 (허용되지 않은 상태 전이 등)
    #[error("불변 조건 위반: {0}")]
    Invariant(String),

    /// 리스크 한도 초과 (서킷 브레이커 발동)
    #[error("리스크 한도 초과: {0}")]
    RiskBreach(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}")]
    RateLimit(String),

    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 트레이딩 작업을 위한 Result 타입.
pub type QuantResult<T> = Result<T, QuantError>;

impl QuantError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuantError::Transient(_) | QuantError::RateLimit(_))
    }

    /// 기동을 중단해야 하는 치명적인 에러인지 확인합니다.
    pub fn is_fatal(&self) -> bool {
        matches!(self, QuantError::Config(_))
    }

    /// 해당 종목/틱만 건너뛰고 계속 진행할 수 있는 에러인지 확인합니다.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            QuantError::DataQuality(_) | QuantError::Transient(_) | QuantError::NotFound(_)
        )
    }
}

impl From<serde_json::Error> for QuantError {
    fn from(err: serde_json::Error) -> Self {
        QuantError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sqlx-support")]
impl From<sqlx::Error> for QuantError {
    fn from(err: sqlx::Error) -> Self {
        QuantError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let transient = QuantError::Transient("data source 503".to_string());
        assert!(transient.is_retryable());

        let invariant = QuantError::Invariant("filled -> pending".to_string());
        assert!(!invariant.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        let config = QuantError::Config("weights do not sum to 1.0".to_string());
        assert!(config.is_fatal());

        let business = QuantError::Business("insufficient cash".to_string());
        assert!(!business.is_fatal());
    }

    #[test]
    fn test_error_skippable() {
        assert!(QuantError::DataQuality("stale score".to_string()).is_skippable());
        assert!(!QuantError::RiskBreach("loss ceiling".to_string()).is_skippable());
    }
}
