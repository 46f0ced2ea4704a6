//! 설정 관리.
//!
//! 기본값 -> TOML 파일 -> 환경 변수 순으로 레이어링합니다.
//! 환경 변수는 `{SERVICE}__{SECTION}__{PARAM}` 형식입니다
//! (예: `TRADING_ENGINE__SIGNAL_GENERATOR__RISK_TOLERANCE_PCT`).
//! `DATABASE_URL`, `REDIS_URL`은 관례에 따라 최우선으로 읽습니다.
//!
//! 잘못된 설정(가중치 합 오류, 범위를 벗어난 임계값)은 기동 시점에
//! 치명적 에러로 처리하며 서비스는 시작을 거부합니다.

use crate::domain::ScoreWeights;
use crate::error::{QuantError, QuantResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 데이터베이스 설정
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Redis 설정
    #[serde(default)]
    pub redis: RedisSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 시그널 생성기 설정
    #[serde(default)]
    pub signal_generator: SignalGeneratorConfig,
    /// 시그널 검증 설정
    #[serde(default)]
    pub validation: ValidationConfig,
    /// 리스크 파라미터
    #[serde(default)]
    pub risk_parameters: RiskParameters,
    /// 포지션 모니터 설정
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// 주문 실행 설정
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// 오케스트레이터 설정
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// 종합 점수 가중치
    #[serde(default)]
    pub score_weights: ScoreWeights,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// 연결 URL (환경 변수 DATABASE_URL이 우선)
    pub url: String,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost:5432/hanquant".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

/// Redis 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSettings {
    /// 연결 URL (환경 변수 REDIS_URL이 우선)
    pub url: String,
    /// 최신가 캐시 TTL (초)
    pub price_ttl_secs: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            price_ttl_secs: 3600,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 시그널 생성기 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalGeneratorConfig {
    /// 최소 종합 점수
    pub min_composite_score: Decimal,
    /// 최소 모멘텀 점수
    pub min_momentum_score: Decimal,
    /// 최소 컨빅션 점수
    pub min_conviction_score: Decimal,
    /// 손절 비율 (%)
    pub stop_loss_pct: Decimal,
    /// 익절 비율 (%)
    pub take_profit_pct: Decimal,
    /// 트레일링 스톱 사용 여부
    pub trailing_enabled: bool,
    /// 트레일링 거리 (%)
    pub trailing_distance_pct: Decimal,
    /// 지정가 주문 할인율 (%)
    pub limit_order_discount_pct: Decimal,
    /// 시장가 주문 사용 여부 (지정가 대신)
    pub use_market_orders: bool,
    /// 펀더멘털 악화 청산 임계값 (종합 점수 하락폭)
    pub score_deterioration_threshold: Decimal,
    /// 포지션 사이징 리스크 허용치 (%)
    pub risk_tolerance_pct: Decimal,
}

impl Default for SignalGeneratorConfig {
    fn default() -> Self {
        Self {
            min_composite_score: Decimal::from(60),
            min_momentum_score: Decimal::from(50),
            min_conviction_score: Decimal::from(60),
            stop_loss_pct: Decimal::from(10),
            take_profit_pct: Decimal::from(20),
            trailing_enabled: true,
            trailing_distance_pct: Decimal::from(10),
            limit_order_discount_pct: Decimal::ONE,
            use_market_orders: false,
            score_deterioration_threshold: Decimal::from(20),
            risk_tolerance_pct: Decimal::TWO,
        }
    }
}

/// 시그널 검증 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    /// 데이터 신선도 한도 (시장시간 기준, 시간)
    pub require_recent_data_hours: i64,
    /// 최소 데이터 품질 점수
    pub min_data_quality_score: Decimal,
    /// 최대 보유 종목 수
    pub max_positions: usize,
    /// 단일 종목 최대 비중 (%)
    pub max_concentration_pct: Decimal,
    /// 섹터 최대 비중 (%)
    pub max_sector_concentration_pct: Decimal,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            require_recent_data_hours: 48,
            min_data_quality_score: Decimal::from(75),
            max_positions: 20,
            max_concentration_pct: Decimal::from(30),
            max_sector_concentration_pct: Decimal::from(40),
        }
    }
}

/// 리스크 파라미터.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskParameters {
    /// 단일 포지션 최대 비중 (%)
    pub max_position_size_pct: Decimal,
    /// 초기 자본 대비 총손실 한도 (%). 경고는 한도의 80%에서 발생
    pub max_total_loss_pct: Decimal,
    /// 리스크 점검 주기 (분)
    pub risk_check_interval_mins: u64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size_pct: Decimal::from(10),
            max_total_loss_pct: Decimal::from(28),
            risk_check_interval_mins: 30,
        }
    }
}

/// 포지션 모니터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// 모니터 주기 (분, 장중)
    pub interval_mins: u64,
    /// 동시 평가 포지션 수
    pub max_parallel_positions: usize,
    /// 기술적 지표 기반 익절 사용 여부
    pub take_profit_use_technical: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_mins: 15,
            max_parallel_positions: 10,
            take_profit_use_technical: false,
        }
    }
}

/// 주문 실행 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// 실행 모드 ("paper" | "live")
    pub mode: String,
    /// 페이퍼 모드 슬리피지 기본값 (bps)
    pub slippage_base_bps: Decimal,
    /// 거래량 충격 계수
    pub slippage_volume_factor: Decimal,
    /// 변동성 계수
    pub slippage_volatility_factor: Decimal,
    /// 슬리피지 난수 시드 (테스트 재현용)
    pub slippage_seed: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: "paper".to_string(),
            slippage_base_bps: Decimal::from(3),
            slippage_volume_factor: Decimal::ONE,
            slippage_volatility_factor: Decimal::from(5),
            slippage_seed: 42,
        }
    }
}

/// 오케스트레이터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// 놓친 트리거 허용 유예 (초)
    pub grace_period_secs: u64,
    /// 종료 시 인플라이트 작업 대기 한도 (초)
    pub shutdown_deadline_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 300,
            shutdown_deadline_secs: 60,
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드하고 검증합니다.
    ///
    /// `service_prefix`는 환경 변수 접두사입니다 (예: "TRADING_ENGINE").
    pub fn load<P: AsRef<Path>>(path: Option<P>, service_prefix: &str) -> QuantResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.as_ref()).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(service_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QuantError::Config(e.to_string()))?;

        // 관례적 환경 변수가 섹션 값을 오버라이드
        if let Ok(url) = std::env::var("DATABASE_URL") {
            loaded.database.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            loaded.redis.url = url;
        }

        loaded.validate()?;
        Ok(loaded)
    }

    /// 설정 값을 검증합니다. 위반은 기동 실패입니다.
    pub fn validate(&self) -> QuantResult<()> {
        self.score_weights.validate()?;

        let pct_fields = [
            ("signal_generator.stop_loss_pct", self.signal_generator.stop_loss_pct),
            ("signal_generator.take_profit_pct", self.signal_generator.take_profit_pct),
            (
                "signal_generator.trailing_distance_pct",
                self.signal_generator.trailing_distance_pct,
            ),
            (
                "validation.max_concentration_pct",
                self.validation.max_concentration_pct,
            ),
            (
                "validation.max_sector_concentration_pct",
                self.validation.max_sector_concentration_pct,
            ),
            (
                "risk_parameters.max_position_size_pct",
                self.risk_parameters.max_position_size_pct,
            ),
            (
                "risk_parameters.max_total_loss_pct",
                self.risk_parameters.max_total_loss_pct,
            ),
        ];
        for (name, value) in pct_fields {
            if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                return Err(QuantError::Config(format!(
                    "{} must be in (0, 100], got {}",
                    name, value
                )));
            }
        }

        if self.signal_generator.min_conviction_score < Decimal::ZERO
            || self.signal_generator.min_conviction_score > Decimal::ONE_HUNDRED
        {
            return Err(QuantError::Config(format!(
                "signal_generator.min_conviction_score must be in [0, 100], got {}",
                self.signal_generator.min_conviction_score
            )));
        }

        if self.validation.max_positions == 0 {
            return Err(QuantError::Config(
                "validation.max_positions must be at least 1".to_string(),
            ));
        }
        if self.monitor.max_parallel_positions == 0 {
            return Err(QuantError::Config(
                "monitor.max_parallel_positions must be at least 1".to_string(),
            ));
        }
        if self.monitor.interval_mins == 0 || self.risk_parameters.risk_check_interval_mins == 0 {
            return Err(QuantError::Config(
                "monitor and risk check intervals must be positive".to_string(),
            ));
        }

        match self.execution.mode.as_str() {
            "paper" | "live" => {}
            other => {
                return Err(QuantError::Config(format!(
                    "execution.mode must be \"paper\" or \"live\", got {:?}",
                    other
                )))
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_percentage_is_fatal() {
        let mut config = AppConfig::default();
        config.risk_parameters.max_total_loss_pct = dec!(150);

        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bad_weights_are_fatal() {
        let mut config = AppConfig::default();
        config.score_weights.value = 0.9;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_execution_mode_rejected() {
        let mut config = AppConfig::default();
        config.execution.mode = "dry-run".to_string();

        assert!(config.validate().is_err());
    }
}
