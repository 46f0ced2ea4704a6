//! API 미들웨어.

pub mod rate_limit;
