//! Structured logging for the hostbridge HTTP bridge
//!
//! This crate provides the ambient observability pieces shared by the
//! transport and server crates:
//! - `tracing-subscriber` initialisation from a serde-friendly config
//! - Per-request structured context with uniform start/end records
//! - Sanitization of scripting arguments before they reach a log line
//! - Process-wide request counters surfaced by the health endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use hostbridge_logging::{LoggingConfig, StructuredContext, StructuredLogger};
//!
//! LoggingConfig::default().initialize().expect("Failed to initialize logging");
//!
//! let ctx = StructuredContext::new("search_functions");
//! StructuredLogger::log_request_start(&ctx, &serde_json::json!({"query": "Reset"}));
//! ```

pub mod metrics;
pub mod sanitization;
pub mod structured;


pub use metrics::{BridgeMetrics, MetricsSnapshot, get_metrics};
pub use sanitization::{LogSanitizer, SanitizationConfig, get_sanitizer};
pub use structured::{
    ErrorClass, LogFormat, LoggingConfig, StructuredContext, StructuredLogger,
};

/// Result type for logging operations
pub type Result<T> = std::result::Result<T, LoggingError>;

/// Logging error types
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracing error: {0}")]
    Tracing(String),
}

/// Classification hook used when logging failed requests
pub trait ErrorClassification: std::fmt::Display + std::error::Error {
    fn error_type(&self) -> &str;
    fn is_client_error(&self) -> bool;
    fn is_downstream_error(&self) -> bool;
}
