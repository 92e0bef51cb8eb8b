//! HTTP-facing errors and the `{"error": ...}` envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::api::ErrorResponse;
use agent_core::AgentError;

#[derive(Debug)]
pub enum ApiError {
    /// `API_KEY` was not set on the server.
    ServerKeyMissing,
    /// Client key absent or wrong.
    Unauthorized,
    /// Body had no usable `question`.
    MissingQuestion,
    /// The agent runtime credential is not configured.
    RuntimeNotConfigured,
    /// The runtime failed; detail is logged, never returned.
    ExecutionFailed,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ServerKeyMissing | Self::RuntimeNotConfigured | Self::ExecutionFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MissingQuestion => StatusCode::BAD_REQUEST,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::ServerKeyMissing => "Server API key not configured",
            Self::Unauthorized => "Unauthorized",
            Self::MissingQuestion => "Missing 'question' in JSON body",
            Self::RuntimeNotConfigured => "Agent runtime not configured",
            Self::ExecutionFailed => "Agent execution failed",
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Configuration(detail) => {
                error!("Agent configuration error: {}", detail);
                Self::RuntimeNotConfigured
            }
            AgentError::InvalidInput(_) => Self::MissingQuestion,
            AgentError::Execution(_) | AgentError::Timeout(_) => Self::ExecutionFailed,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
