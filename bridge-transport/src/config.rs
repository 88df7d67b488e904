//! Transport configuration

use serde::{Deserialize, Serialize};

/// Configuration for the embedded HTTP listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Host to bind to (default: localhost)
    pub host: String,
    /// Port to bind to; `0` picks an ephemeral port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_bytes: usize,
    /// Keep-alive interval of the event stream in seconds
    pub keep_alive_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
            enable_cors: true,
            max_body_bytes: 1024 * 1024,
            keep_alive_secs: 15,
        }
    }
}

impl HttpConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `host:port` as shown in logs
    pub fn display_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
