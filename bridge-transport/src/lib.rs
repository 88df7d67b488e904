//! HTTP transport for the hostbridge bridge
//!
//! This crate owns everything with a socket behind it:
//! - [`listener::SharedServerState`]: at most one embedded listener per process,
//!   shared by every extension instance that asks for one
//! - [`stream_guard::StreamGuard`]: the single-subscriber `/events` stream
//! - [`http::HttpListener`]: the axum router serving `/search`, `/dispatch`,
//!   `/operations`, `/events` and `/health`
//!
//! Request semantics live behind the [`BridgeHandler`] trait, implemented by
//! the server crate.

pub mod config;
pub mod events;
pub mod http;
pub mod listener;
pub mod stream_guard;

#[cfg(test)]
mod listener_tests;
#[cfg(test)]
mod stream_guard_tests;

use async_trait::async_trait;
use hostbridge_protocol::{
    BridgeError, BridgeResult, ContextSummary, DispatchRequest, DispatchResponse,
    OperationDescriptor, PaginatedSearchResponse, SearchRequest,
};
use thiserror::Error as ThisError;

pub use config::HttpConfig;
pub use events::EventHub;
pub use http::{
    ApiError, HealthReport, HealthStatus, HttpListener, HttpState, ListenerInfo, build_router,
};
pub use listener::{ManagedListener, ServerHandle, SharedServerState, shared_http_state};
pub use stream_guard::{StreamGuard, StreamLease, StreamStatus};

#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("Transport configuration error: {0}")]
    Config(String),

    #[error("Failed to bind {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<TransportError> for BridgeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Config(msg) => BridgeError::listener(format!("configuration: {msg}")),
            other => BridgeError::listener(other.to_string()),
        }
    }
}

/// Request semantics behind the HTTP routes
#[async_trait]
pub trait BridgeHandler: Send + Sync + 'static {
    /// Exhaustive search with local pagination
    async fn search(&self, request: SearchRequest) -> BridgeResult<PaginatedSearchResponse>;

    /// Forward a whitelisted operation to the active provider
    async fn dispatch(&self, request: DispatchRequest) -> BridgeResult<DispatchResponse>;

    /// Operations the dispatcher will forward
    fn operations(&self) -> Vec<OperationDescriptor>;

    /// Current registry view
    fn context_summary(&self) -> ContextSummary;
}
