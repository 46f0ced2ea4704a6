//! 데이터 계층 에러 타입.

use hanquant_core::QuantError;
use thiserror::Error;

/// 데이터 접근 에러.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 에러
    #[error("데이터베이스 에러: {0}")]
    Database(String),

    /// 캐시 에러
    #[error("캐시 에러: {0}")]
    Cache(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 신선도 기준 미달
    #[error("오래된 데이터: {0}")]
    Stale(String),

    /// 외부 시세 제공자 에러
    #[error("시세 제공자 에러: {0}")]
    Provider(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),
}

/// 데이터 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, DataError>;

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        DataError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        DataError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

impl From<DataError> for QuantError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Database(msg) => QuantError::Database(msg),
            DataError::Cache(msg) => QuantError::Transient(msg),
            DataError::Serialization(msg) => QuantError::Serialization(msg),
            DataError::Stale(msg) => QuantError::DataQuality(msg),
            DataError::Provider(msg) => QuantError::Transient(msg),
            DataError::NotFound(msg) => QuantError::NotFound(msg),
        }
    }
}
