//! Unified error handling for the agent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clubsync_engine::Error as EngineError;
use serde::Serialize;

/// Agent error type.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AgentError::Engine(e) => match e {
                EngineError::UnknownKey(_)
                | EngineError::EventNotFound(_)
                | EngineError::BackupNotFound(_) => (StatusCode::NOT_FOUND, e.to_string(), None),
                EngineError::Serialization { .. } | EngineError::InvalidRecord(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string(), None)
                }
                EngineError::Storage(_) | EngineError::InvalidTimestamp(_) => {
                    tracing::error!(error = %e, "Store error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Store error".to_string(),
                        Some(e.to_string()),
                    )
                }
            },
            AgentError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AgentError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (AgentError::from(EngineError::UnknownKey("x".into())), StatusCode::NOT_FOUND),
            (
                AgentError::from(EngineError::Storage("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AgentError::from(EngineError::InvalidRecord("grade".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AgentError::from(EngineError::EventNotFound("e1".into())),
                StatusCode::NOT_FOUND,
            ),
            (AgentError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (AgentError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
