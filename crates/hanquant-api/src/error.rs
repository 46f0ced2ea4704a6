//! API 에러 응답 매핑.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hanquant_core::QuantError;
use serde::Serialize;

/// HTTP 응답으로 변환되는 API 에러.
#[derive(Debug)]
pub struct ApiError(pub QuantError);

/// 에러 응답 본문.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            QuantError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            QuantError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            QuantError::Business(_) => (StatusCode::UNPROCESSABLE_ENTITY, "business"),
            QuantError::RiskBreach(_) => (StatusCode::LOCKED, "risk_breach"),
            QuantError::RateLimit(_) => (StatusCode::TOO_MANY_REQUESTS, "rate_limit"),
            QuantError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "transient"),
            QuantError::DataQuality(_) => (StatusCode::SERVICE_UNAVAILABLE, "data_quality"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        let body = ErrorBody {
            error: self.0.to_string(),
            kind,
        };
        (status, Json(body)).into_response()
    }
}

impl From<QuantError> for ApiError {
    fn from(err: QuantError) -> Self {
        ApiError(err)
    }
}
