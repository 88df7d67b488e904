//! Structured request logging
//!
//! Every bridge request gets a [`StructuredContext`] carrying a request id,
//! the operation name and a start instant. [`StructuredLogger`] emits the
//! uniform start/end records for it.

use crate::sanitization::get_sanitizer;
use crate::{LoggingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// A subscriber that is already installed (another extension instance in
    /// the same process got there first) is left in place.
    pub fn initialize(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| LoggingError::Config(format!("Invalid log level: {e}")))?;

        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .try_init(),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init(),
        };

        if let Err(e) = installed {
            tracing::debug!("Global subscriber already installed: {}", e);
        }

        Ok(())
    }
}

/// Per-request logging context
#[derive(Debug, Clone)]
pub struct StructuredContext {
    pub request_id: String,
    pub operation: String,
    pub start_time: Instant,
    pub custom_fields: HashMap<String, Value>,
}

impl StructuredContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            operation: operation.into(),
            start_time: Instant::now(),
            custom_fields: HashMap::new(),
        }
    }

    /// Add custom field
    pub fn with_field<K: ToString, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.custom_fields.insert(key.to_string(), value.into());
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

/// Coarse error class recorded on failed requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller sent something the bridge refuses
    Client { error_type: String },
    /// The host's scripting call failed
    Downstream { error_type: String },
    /// Everything else
    Server { error_type: String },
}

impl ErrorClass {
    pub fn from_error<E: crate::ErrorClassification>(error: &E) -> Self {
        let error_type = error.error_type().to_string();
        if error.is_client_error() {
            Self::Client { error_type }
        } else if error.is_downstream_error() {
            Self::Downstream { error_type }
        } else {
            Self::Server { error_type }
        }
    }
}

/// Uniform request start/end records
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_request_start(ctx: &StructuredContext, params: &Value) {
        let sanitized_params = get_sanitizer().sanitize_context(params);

        info!(
            request_id = %ctx.request_id,
            operation = %ctx.operation,
            params = %sanitized_params,
            custom_fields = ?ctx.custom_fields,
            "Bridge request started"
        );
    }

    pub fn log_request_end<E: crate::ErrorClassification>(
        ctx: &StructuredContext,
        error: Option<&E>,
    ) {
        let duration_ms = ctx.elapsed_ms();

        match error {
            None => {
                info!(
                    request_id = %ctx.request_id,
                    operation = %ctx.operation,
                    duration_ms = duration_ms,
                    "Bridge request completed"
                );
            }
            Some(err) => {
                let error_class = ErrorClass::from_error(err);
                let message = get_sanitizer().sanitize_error(err);
                match error_class {
                    ErrorClass::Client { .. } => warn!(
                        request_id = %ctx.request_id,
                        operation = %ctx.operation,
                        duration_ms = duration_ms,
                        error_class = ?error_class,
                        error_message = %message,
                        "Bridge request rejected"
                    ),
                    _ => error!(
                        request_id = %ctx.request_id,
                        operation = %ctx.operation,
                        duration_ms = duration_ms,
                        error_class = ?error_class,
                        error_message = %message,
                        "Bridge request failed"
                    ),
                }
            }
        }
    }

    pub fn log_slow_request(ctx: &StructuredContext, threshold_ms: u64) {
        let duration_ms = ctx.elapsed_ms();
        if duration_ms > threshold_ms {
            warn!(
                request_id = %ctx.request_id,
                operation = %ctx.operation,
                duration_ms = duration_ms,
                threshold_ms = threshold_ms,
                "Slow bridge request detected"
            );
        }
    }

    /// Span covering the lifetime of a request
    pub fn create_span(ctx: &StructuredContext) -> tracing::Span {
        tracing::info_span!(
            "bridge_request",
            request_id = %ctx.request_id,
            operation = %ctx.operation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Rejected;

    impl fmt::Display for Rejected {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "rejected")
        }
    }

    impl std::error::Error for Rejected {}

    impl crate::ErrorClassification for Rejected {
        fn error_type(&self) -> &str {
            "unsupported_operation"
        }
        fn is_client_error(&self) -> bool {
            true
        }
        fn is_downstream_error(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_log_format_serialization() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "pretty"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = StructuredContext::new("list_functions");
        let b = StructuredContext::new("list_functions");
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.operation, "list_functions");
    }

    #[test]
    fn test_context_fields() {
        let ctx = StructuredContext::new("search_functions").with_field("limit", 5);
        assert_eq!(ctx.custom_fields.get("limit"), Some(&Value::from(5)));
    }

    #[test]
    fn test_error_class() {
        assert_eq!(
            ErrorClass::from_error(&Rejected),
            ErrorClass::Client {
                error_type: "unsupported_operation".to_string()
            }
        );
    }

    #[test]
    fn test_log_calls_do_not_panic_without_subscriber() {
        let ctx = StructuredContext::new("get_version");
        StructuredLogger::log_request_start(&ctx, &serde_json::json!({"token": "abc"}));
        StructuredLogger::log_request_end::<Rejected>(&ctx, None);
        StructuredLogger::log_request_end(&ctx, Some(&Rejected));
        StructuredLogger::log_slow_request(&ctx, 0);
        let _span = StructuredLogger::create_span(&ctx);
    }
}
