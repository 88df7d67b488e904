//! Log sanitization for scripting arguments
//!
//! Arguments forwarded to the host are arbitrary JSON supplied by the
//! client. Before they are logged, secret-looking values are redacted and
//! oversized strings are truncated.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

static PASSWORD_REGEX: OnceLock<Regex> = OnceLock::new();
static TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();
static API_KEY_REGEX: OnceLock<Regex> = OnceLock::new();

fn init_sanitization_patterns() {
    PASSWORD_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(password|passwd|pwd)(["']?\s*[=:]\s*["']?)([^'"\s,}]+)"#)
            .expect("Invalid password regex")
    });

    TOKEN_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(token|bearer|secret)(["']?\s*[=:\s]\s*["']?)([a-zA-Z0-9._\-]+)"#)
            .expect("Invalid token regex")
    });

    API_KEY_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)(api[_-]?key|apikey)(["']?\s*[=:]\s*["']?)([a-zA-Z0-9._\-]+)"#)
            .expect("Invalid API key regex")
    });
}

/// Sanitization configuration
#[derive(Debug, Clone)]
pub struct SanitizationConfig {
    pub enabled: bool,
    /// Strings longer than this are cut and suffixed with `...`
    pub max_value_len: usize,
    pub replacement: String,
}

impl Default for SanitizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_value_len: 256,
            replacement: "[REDACTED]".to_string(),
        }
    }
}

/// Log sanitizer for removing sensitive information
pub struct LogSanitizer {
    config: SanitizationConfig,
}

impl LogSanitizer {
    pub fn new() -> Self {
        Self::with_config(SanitizationConfig::default())
    }

    pub fn with_config(config: SanitizationConfig) -> Self {
        init_sanitization_patterns();
        Self { config }
    }

    /// Redact secrets embedded in free text
    pub fn sanitize(&self, message: &str) -> String {
        if !self.config.enabled {
            return message.to_string();
        }

        let mut sanitized = message.to_string();
        for regex in [&PASSWORD_REGEX, &TOKEN_REGEX, &API_KEY_REGEX]
            .into_iter()
            .filter_map(|cell| cell.get())
        {
            let replacement = format!("${{1}}${{2}}{}", self.config.replacement);
            sanitized = regex
                .replace_all(&sanitized, replacement.as_str())
                .to_string();
        }

        self.truncate(sanitized)
    }

    pub fn sanitize_error(&self, error: &dyn std::error::Error) -> String {
        self.sanitize(&error.to_string())
    }

    /// Sanitize a JSON argument payload
    pub fn sanitize_context(&self, context: &Value) -> Value {
        if !self.config.enabled {
            return context.clone();
        }

        match context {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| {
                        let value = if Self::is_sensitive_field(key) {
                            Value::String(self.config.replacement.clone())
                        } else {
                            self.sanitize_context(value)
                        };
                        (key.clone(), value)
                    })
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.sanitize_context(v)).collect())
            }
            Value::String(s) => Value::String(self.sanitize(s)),
            other => other.clone(),
        }
    }

    fn truncate(&self, mut value: String) -> String {
        if value.chars().count() > self.config.max_value_len {
            value = value.chars().take(self.config.max_value_len).collect();
            value.push_str("...");
        }
        value
    }

    fn is_sensitive_field(field_name: &str) -> bool {
        let lower_name = field_name.to_lowercase();
        lower_name.contains("password")
            || lower_name.contains("passwd")
            || lower_name.contains("token")
            || lower_name.contains("secret")
            || lower_name.contains("api_key")
            || lower_name.contains("apikey")
            || lower_name.contains("credential")
            || lower_name == "authorization"
    }
}

impl Default for LogSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_SANITIZER: OnceLock<LogSanitizer> = OnceLock::new();

/// Get the global sanitizer instance
pub fn get_sanitizer() -> &'static LogSanitizer {
    GLOBAL_SANITIZER.get_or_init(LogSanitizer::new)
}

