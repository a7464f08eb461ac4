//! HTTP mapping of engine errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use gpuslot_core::GpuslotError;
use serde::Serialize;

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError(pub GpuslotError);

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    retryable: bool,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GpuslotError::Validation(_) | GpuslotError::Serialization(_) => StatusCode::BAD_REQUEST,
            GpuslotError::NotFound { .. } => StatusCode::NOT_FOUND,
            GpuslotError::Conflict(_) | GpuslotError::AlreadyResolved(_) => StatusCode::CONFLICT,
            GpuslotError::Expired(_) => StatusCode::GONE,
            GpuslotError::Forbidden(_) => StatusCode::FORBIDDEN,
            GpuslotError::Upstream(_) | GpuslotError::Io(_) => StatusCode::SERVICE_UNAVAILABLE,
            GpuslotError::Config(_) | GpuslotError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<GpuslotError> for ApiError {
    fn from(err: GpuslotError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.0.kind(),
                message: self.0.to_string(),
                retryable: self.0.is_retryable(),
            },
        };
        (status, Json(body)).into_response()
    }
}
