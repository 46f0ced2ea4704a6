//! # HanQuant Risk
//!
//! 시그널 파이프라인의 리스크 계층입니다:
//! - 컨빅션 스코어러: 가치/모멘텀/거래량/퀄리티 가중 결합 [0, 100]
//! - 포지션 사이저: 5가지 사이징 정책 + 포지션/포트폴리오 상한
//! - 리스크 엔진 / 서킷 브레이커: 총손실 한도 감시와 비상 청산

pub mod circuit_breaker;
pub mod config;
pub mod conviction;
pub mod sizing;

pub use circuit_breaker::*;
pub use config::*;
pub use conviction::*;
pub use sizing::*;
