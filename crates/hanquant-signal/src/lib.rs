//! # HanQuant Signal
//!
//! 트레이딩 시그널 파이프라인입니다:
//! - 생성기(C6): 스크리닝된 종목 -> 진입 시그널, 보유 포지션 -> 청산 시그널
//! - 검증기(C7): 데이터 신선도/품질, 집중도, 현금, 정지 플래그 게이트
//! - 포지션 모니터(C9): 손절/트레일링/익절 트리거의 주기적 평가

pub mod engine;
pub mod generator;
pub mod monitor;
pub mod validator;

pub use engine::*;
pub use generator::*;
pub use monitor::*;
pub use validator::*;
