//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::ocr::{OcrError, ServiceError};
use crate::pool::PoolError;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Pool(e) => Self::Pool(e),
            ServiceError::Ocr(e) => Self::Ocr(e),
        }
    }
}

impl ApiError {
    /// Service-busy conditions map to 503 so clients can distinguish
    /// saturation (retryable) from OCR-specific failures.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Ocr(OcrError::InvalidOptions(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Pool(PoolError::Timeout) | Self::Pool(PoolError::Closed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Pool(PoolError::WorkerCreation(_)) | Self::Ocr(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
