//! HTTP-facing error type
//!
//! Runtime configuration endpoints never use this: their expected failures are
//! reported in the `{success, error}` body. `AppError` covers the offer
//! endpoint, where negotiation itself can fail.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::core::transport::TransportError;
use crate::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_)
            | AppError::Session(SessionError::Transport(TransportError::InvalidDescription(_))) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Session(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Session(SessionError::Transport(TransportError::InvalidDescription(_))) => {
                "invalid_session_description"
            }
            AppError::Session(SessionError::Transport(_)) => "transport_error",
            AppError::Session(SessionError::NoProvider(_)) => "no_provider",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Session(SessionError::Transport(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (status, body).into_response()
    }
}
