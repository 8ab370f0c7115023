//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use verlog_engine::Error as EngineError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Engine(e) => match e {
                EngineError::OutOfRange { .. } | EngineError::NoVersionAtTime(_) => {
                    StatusCode::NOT_FOUND
                }
                EngineError::NoHistory => StatusCode::CONFLICT,
                EngineError::UnknownPolicy { .. } => StatusCode::BAD_REQUEST,
                EngineError::FormatMismatch { .. }
                | EngineError::InvariantViolation(_)
                | EngineError::InvalidLogData(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("Database error".to_string(), None)
            }
            AppError::Engine(e) if status.is_server_error() => {
                tracing::error!("Stored history unusable: {:?}", e);
                ("Stored history is unusable".to_string(), Some(e.to_string()))
            }
            AppError::Engine(e) => {
                tracing::debug!("Engine error: {:?}", e);
                (e.to_string(), None)
            }
            AppError::BadRequest(msg) | AppError::NotFound(msg) => (msg.clone(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = vec![
            (
                EngineError::OutOfRange {
                    requested: 9,
                    first: 1,
                    current: 2,
                },
                StatusCode::NOT_FOUND,
            ),
            (EngineError::NoVersionAtTime(5), StatusCode::NOT_FOUND),
            (EngineError::NoHistory, StatusCode::CONFLICT),
            (
                EngineError::FormatMismatch {
                    expected: 1,
                    actual: 2,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EngineError::InvariantViolation("gap".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                EngineError::InvalidLogData("bad".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(AppError::from(error).status(), status);
        }
    }

    #[test]
    fn request_errors_map_to_statuses() {
        assert_eq!(
            AppError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn response_carries_status() {
        let response = AppError::from(EngineError::NoHistory).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
