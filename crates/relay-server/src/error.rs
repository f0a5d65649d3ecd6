use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::RelayError;

use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// Sentinels for explicit statuses
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 409 through the `anyhow::Error` chain.
#[derive(Debug)]
struct ConflictError(String);

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConflictError {}

/// Carries an explicit HTTP 400.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(ConflictError(msg.into()).into())
    }

    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<ConflictError>().is_some() {
            return StatusCode::CONFLICT;
        }
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        if let Some(e) = self.0.downcast_ref::<RelayError>() {
            return match e {
                RelayError::NotInitialized(_)
                | RelayError::InvalidConfig(_)
                | RelayError::InvalidState(_)
                | RelayError::InvalidAction(_)
                | RelayError::InvalidControlId(_) => StatusCode::BAD_REQUEST,
                RelayError::RecordNotFound(_) | RelayError::AnnouncementNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                RelayError::RecordExists(_) | RelayError::CacheLocked(_) => StatusCode::CONFLICT,
                RelayError::CorruptRecord { .. }
                | RelayError::Store(_)
                | RelayError::CacheDb(_)
                | RelayError::Io(_)
                | RelayError::Yaml(_)
                | RelayError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
        }
        if self.0.downcast_ref::<TransportError>().is_some() {
            return StatusCode::BAD_GATEWAY;
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
