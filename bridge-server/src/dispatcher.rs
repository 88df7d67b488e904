//! Whitelisted forwarding of scripting calls to the active provider
//!
//! Only operations named in the [`CommandWhitelist`] ever reach a provider.
//! Everything else is rejected with `UnsupportedOperation` before the
//! registry is even consulted.

use crate::provider::ProviderError;
use crate::registry::ContextRegistry;
use hostbridge_logging::{BridgeMetrics, StructuredContext, StructuredLogger, get_metrics};
use hostbridge_protocol::{
    BridgeError, BridgeResult, ContextRequirement, DispatchRequest, DispatchResponse,
    OperationDescriptor,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Instrument, debug, warn};

const SLOW_DISPATCH_MS: u64 = 5_000;

/// One allowed operation and the capability class it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub name: String,
    #[serde(default)]
    pub requires_program: bool,
}

impl WhitelistEntry {
    pub fn program(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_program: true,
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_program: false,
        }
    }

    pub fn requirement(&self) -> ContextRequirement {
        ContextRequirement::from_requires_program(self.requires_program)
    }
}

/// Read-only analysis primitives that need an open program
const PROGRAM_OPERATIONS: &[&str] = &[
    "search_functions",
    "list_functions",
    "decompile_function",
    "disassemble_function",
    "get_function_by_address",
    "list_segments",
    "list_imports",
    "list_exports",
    "list_strings",
    "get_current_address",
    "get_current_function",
];

/// Queries any attached view can answer
const CONTEXT_FREE_OPERATIONS: &[&str] = &["get_version", "list_open_programs"];

/// Fixed allow-list of operation names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWhitelist {
    entries: BTreeMap<String, WhitelistEntry>,
}

impl CommandWhitelist {
    /// Build from explicit entries; a later duplicate replaces an earlier one
    pub fn new(entries: impl IntoIterator<Item = WhitelistEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        }
    }

    pub fn get(&self, operation: &str) -> Option<&WhitelistEntry> {
        self.entries.get(operation)
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.entries.contains_key(operation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by name
    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        self.entries
            .values()
            .map(|entry| OperationDescriptor {
                name: entry.name.clone(),
                requirement: entry.requirement(),
            })
            .collect()
    }
}

impl Default for CommandWhitelist {
    fn default() -> Self {
        Self::new(
            PROGRAM_OPERATIONS
                .iter()
                .map(|name| WhitelistEntry::program(*name))
                .chain(
                    CONTEXT_FREE_OPERATIONS
                        .iter()
                        .map(|name| WhitelistEntry::any(*name)),
                ),
        )
    }
}

/// Forwards whitelisted operations to the active provider
pub struct CommandDispatcher {
    registry: Arc<ContextRegistry>,
    whitelist: CommandWhitelist,
    metrics: &'static BridgeMetrics,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<ContextRegistry>, whitelist: CommandWhitelist) -> Self {
        Self {
            registry,
            whitelist,
            metrics: get_metrics(),
        }
    }

    pub fn whitelist(&self) -> &CommandWhitelist {
        &self.whitelist
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Forward `operation` with `args` and return the provider's result verbatim
    ///
    /// # Errors
    ///
    /// - `UnsupportedOperation` if `operation` is not whitelisted
    /// - `NoActiveContext` if no provider serves its capability class
    /// - `DownstreamFailure` if the scripting call fails, times out or panics
    pub async fn dispatch(&self, operation: &str, args: Value) -> BridgeResult<Value> {
        let ctx = StructuredContext::new(operation);
        let span = StructuredLogger::create_span(&ctx);
        StructuredLogger::log_request_start(&ctx, &args);

        let result = self.forward(operation, args).instrument(span).await;

        StructuredLogger::log_request_end(&ctx, result.as_ref().err());
        StructuredLogger::log_slow_request(&ctx, SLOW_DISPATCH_MS);
        result
    }

    /// Typed wrapper used by the HTTP layer
    pub async fn dispatch_request(
        &self,
        request: DispatchRequest,
    ) -> BridgeResult<DispatchResponse> {
        let result = self.dispatch(&request.operation, request.args).await?;
        Ok(DispatchResponse {
            operation: request.operation,
            result,
        })
    }

    async fn forward(&self, operation: &str, args: Value) -> BridgeResult<Value> {
        let Some(entry) = self.whitelist.get(operation) else {
            self.metrics.record_unsupported_operation();
            warn!("Rejected non-whitelisted operation '{}'", operation);
            return Err(BridgeError::unsupported_operation(operation));
        };
        let requirement = entry.requirement();

        // `active_for` returns an owned handle; no registry lock is held past this line.
        let Some(provider) = self.registry.active_for(requirement) else {
            self.metrics.record_no_context();
            return Err(BridgeError::no_active_context(requirement));
        };

        self.metrics.record_dispatch();
        debug!(
            "Forwarding '{}' to provider '{}'",
            operation,
            provider.name()
        );

        let op = operation.to_string();
        let outcome = match tokio::task::spawn_blocking(move || provider.invoke(&op, &args)).await
        {
            Ok(outcome) => outcome,
            Err(e) => Err(ProviderError::failed(format!("scripting call aborted: {e}"))),
        };

        outcome.map_err(|e| {
            self.metrics.record_downstream_failure();
            downstream_error(operation, e)
        })
    }
}

fn downstream_error(operation: &str, error: ProviderError) -> BridgeError {
    BridgeError::downstream(operation, error.to_string())
}
