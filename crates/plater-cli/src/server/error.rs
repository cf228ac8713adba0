use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use plater_core::SliceError;
use serde::Serialize;

#[derive(Debug)]
pub struct ApiError(SliceError);

impl From<SliceError> for ApiError {
    fn from(err: SliceError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            SliceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            SliceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            SliceError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            SliceError::FatalSession { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "fatal_session"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("[Server] request failed: {}", self.0);
        }
        let body = ErrorBody {
            error: code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
