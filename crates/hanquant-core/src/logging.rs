//! tracing 기반 로깅 인프라.
//!
//! `LoggingConfig`의 level/format에 따라 구조화 로깅을 초기화합니다.
//! - **pretty**: 개발용
//! - **json**: 운영/로그 집계용
//! - **compact**: 간결한 한 줄 형식

use crate::config::LoggingConfig;
use crate::error::{QuantError, QuantResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 색상이 포함된 사람이 읽기 쉬운 형식
    #[default]
    Pretty,
    /// JSON 형식
    Json,
    /// 간결한 한 줄 형식
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = QuantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(QuantError::Config(format!("unknown log format: {}", other))),
        }
    }
}

/// 로깅 시스템을 초기화합니다.
///
/// `RUST_LOG` 환경 변수가 설정되어 있으면 그 값이 설정 파일의 레벨보다
/// 우선합니다.
pub fn init_logging(config: &LoggingConfig) -> QuantResult<()> {
    let format: LogFormat = config.format.parse()?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| QuantError::Config(format!("invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init(),
    };
    result.map_err(|e| QuantError::Internal(format!("failed to init logging: {}", e)))?;

    tracing::info!(level = %config.level, format = ?format, "Logging initialized");
    Ok(())
}
