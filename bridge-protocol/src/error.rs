//! Error taxonomy for the bridge
//!
//! Every failure a caller can observe is one of these variants. The HTTP
//! layer maps them onto status codes with [`BridgeError::status_code`] and
//! onto a JSON body with [`ErrorResponse`].

use crate::model::ContextRequirement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced by the bridge core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("No active context available (requires {requirement})")]
    NoActiveContext { requirement: ContextRequirement },

    #[error("Operation not allowed: {0}")]
    UnsupportedOperation(String),

    #[error("Downstream call '{operation}' failed: {message}")]
    DownstreamFailure { operation: String, message: String },

    #[error("An event stream session is already active")]
    SessionConflict,

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Event stream unavailable: listener is stopping")]
    StreamClosed,

    #[error("Listener error: {0}")]
    Listener(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn no_active_context(requirement: ContextRequirement) -> Self {
        Self::NoActiveContext { requirement }
    }

    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation(operation.into())
    }

    pub fn downstream(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownstreamFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn method_not_allowed(method: impl Into<String>) -> Self {
        Self::MethodNotAllowed(method.into())
    }

    pub fn listener(message: impl Into<String>) -> Self {
        Self::Listener(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable machine-readable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::NoActiveContext { .. } => ErrorCode::NoActiveContext,
            Self::UnsupportedOperation(_) => ErrorCode::UnsupportedOperation,
            Self::DownstreamFailure { .. } => ErrorCode::DownstreamFailure,
            Self::SessionConflict => ErrorCode::SessionConflict,
            Self::MethodNotAllowed(_) => ErrorCode::MethodNotAllowed,
            Self::StreamClosed => ErrorCode::StreamClosed,
            Self::Listener(_) => ErrorCode::ListenerError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// HTTP status code this error is surfaced with
    pub fn status_code(&self) -> u16 {
        self.code().status_code()
    }

    /// Name of the offending input field, for validation failures
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Error codes carried in JSON error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    NoActiveContext,
    UnsupportedOperation,
    DownstreamFailure,
    SessionConflict,
    MethodNotAllowed,
    StreamClosed,
    ListenerError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::NoActiveContext => "no_active_context",
            ErrorCode::UnsupportedOperation => "unsupported_operation",
            ErrorCode::DownstreamFailure => "downstream_failure",
            ErrorCode::SessionConflict => "session_conflict",
            ErrorCode::MethodNotAllowed => "method_not_allowed",
            ErrorCode::StreamClosed => "stream_closed",
            ErrorCode::ListenerError => "listener_error",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::UnsupportedOperation => 403,
            ErrorCode::MethodNotAllowed => 405,
            ErrorCode::SessionConflict => 409,
            ErrorCode::DownstreamFailure => 502,
            ErrorCode::NoActiveContext | ErrorCode::StreamClosed => 503,
            ErrorCode::ListenerError | ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON error body: `{"error": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error details inside an [`ErrorResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&BridgeError> for ErrorResponse {
    fn from(err: &BridgeError) -> Self {
        Self {
            error: ErrorDetail {
                code: err.code(),
                message: err.to_string(),
                field: err.field().map(str::to_string),
            },
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::validation("body", err.to_string())
    }
}

#[cfg(feature = "logging")]
impl hostbridge_logging::ErrorClassification for BridgeError {
    fn error_type(&self) -> &str {
        self.code().as_str()
    }

    fn is_client_error(&self) -> bool {
        matches!(
            self,
            BridgeError::Validation { .. }
                | BridgeError::UnsupportedOperation(_)
                | BridgeError::SessionConflict
                | BridgeError::MethodNotAllowed(_)
        )
    }

    fn is_downstream_error(&self) -> bool {
        matches!(self, BridgeError::DownstreamFailure { .. })
    }
}
