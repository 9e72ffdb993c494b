//! Gateway error type.
//!
//! Every failure the relay surfaces to a caller goes through [`GatewayError`],
//! which renders the OpenAI-style `{"error": {...}}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Request carried no model, or a blank one.
    ModelRequired,
    /// Multipart body sent to an endpoint that only takes JSON.
    FormDataNotAllowed,
    /// Body could not be read or parsed.
    InvalidBody(String),
    /// Caller credential missing or rejected.
    Unauthorized(String),
    /// Caller's model allowlist is empty.
    NoModelsAllowed,
    /// Caller's model allowlist does not contain the model.
    ModelNotAllowed(String),
    /// Caller's provider allowlist is empty.
    NoProvidersAllowed,
    /// No enabled provider serves the model.
    ModelNotFound(String),
    /// Attempt budget spent without a successful upstream response.
    AllAttemptsFailed,
    /// Invariant violation; detail is logged, not returned.
    Internal(String),
    /// Request deadline elapsed.
    Timeout,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelRequired => write!(f, "Model is required"),
            Self::FormDataNotAllowed => write!(f, "Form data is not allowed for this endpoint"),
            Self::InvalidBody(msg) => write!(f, "Invalid request body: {}", msg),
            Self::Unauthorized(msg) => write!(f, "{}", msg),
            Self::NoModelsAllowed => write!(f, "No models are allowed for this API key"),
            Self::ModelNotAllowed(model) => {
                write!(f, "Model {} is not allowed for this API key", model)
            }
            Self::NoProvidersAllowed => write!(f, "No providers are allowed for this API key"),
            Self::ModelNotFound(model) => write!(f, "Model {} not found", model),
            Self::AllAttemptsFailed => write!(f, "All attempts failed. Please try again later."),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for GatewayError {}

#[derive(Serialize)]
struct ErrorResponseBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    r#type: &'static str,
    param: Option<&'static str>,
    code: Option<&'static str>,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ModelRequired | Self::FormDataNotAllowed | Self::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NoModelsAllowed | Self::ModelNotAllowed(_) | Self::NoProvidersAllowed => {
                StatusCode::FORBIDDEN
            }
            Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::AllAttemptsFailed | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ModelRequired
            | Self::FormDataNotAllowed
            | Self::InvalidBody(_)
            | Self::ModelNotFound(_) => "invalid_request_error",
            Self::Unauthorized(_) => "authentication_error",
            Self::NoModelsAllowed | Self::ModelNotAllowed(_) | Self::NoProvidersAllowed => {
                "permission_error"
            }
            Self::AllAttemptsFailed | Self::Internal(_) => "server_error",
            Self::Timeout => "timeout_error",
        }
    }

    fn param(&self) -> Option<&'static str> {
        match self {
            Self::ModelRequired | Self::ModelNotAllowed(_) | Self::ModelNotFound(_) => {
                Some("model")
            }
            _ => None,
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            Self::ModelNotFound(_) => Some("model_not_found"),
            Self::Unauthorized(_) => Some("invalid_api_key"),
            _ => None,
        }
    }

    /// Message shown to the caller. Internal detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!("Internal error: {}", detail);
        }

        let body = ErrorResponseBody {
            error: ErrorDetail {
                message: self.public_message(),
                r#type: self.error_type(),
                param: self.param(),
                code: self.code(),
            },
        };

        (self.status_code(), Json(body)).into_response()
    }
}
