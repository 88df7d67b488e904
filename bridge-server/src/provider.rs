//! Context providers: attached views of the host that answer scripting calls

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a provider's scripting call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    Failed(String),

    #[error("Scripting call timed out after {0} ms")]
    Timeout(u64),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Capability handle for one attached view of the host
///
/// The registry only ever looks at the two capability queries; identity is
/// the allocation behind the `Arc`, see [`same_provider`].
pub trait ContextProvider: Send + Sync + 'static {
    /// Human-readable name used in logs and the health report
    fn name(&self) -> &str;

    /// Whether the view can currently answer program-scoped queries
    fn has_program_context(&self) -> bool;

    /// Whether the view may own the shared listener
    fn has_program_manager_service(&self) -> bool;

    /// Run a scripting call. Blocking; the dispatcher calls it off the async
    /// runtime and without holding any registry lock.
    fn invoke(&self, operation: &str, args: &Value) -> Result<Value, ProviderError>;
}

/// Shared handle to a registered provider
pub type ProviderRef = Arc<dyn ContextProvider>;

/// Reference equality between two provider handles
pub fn same_provider(a: &ProviderRef, b: &ProviderRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
