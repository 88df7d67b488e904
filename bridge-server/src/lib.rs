//! Request semantics of the hostbridge HTTP bridge
//!
//! This crate decides who answers a request and what is allowed to reach
//! the host's scripting surface:
//! - [`registry::ContextRegistry`] tracks attached providers and the active
//!   one per capability class
//! - [`dispatcher::CommandDispatcher`] forwards only whitelisted operations
//! - [`search::search_functions`] fetches the full result set and paginates
//!   locally
//! - [`server::BridgeServer`] wires provider attach/detach to the shared
//!   HTTP listener
//!
//! # Example
//!
//! ```rust,no_run
//! use hostbridge_server::{BridgeConfig, BridgeServer, ContextProvider, ProviderError};
//! use serde_json::{Value, json};
//! use std::sync::Arc;
//!
//! struct CodeBrowser;
//!
//! impl ContextProvider for CodeBrowser {
//!     fn name(&self) -> &str {
//!         "CodeBrowser"
//!     }
//!     fn has_program_context(&self) -> bool {
//!         true
//!     }
//!     fn has_program_manager_service(&self) -> bool {
//!         true
//!     }
//!     fn invoke(&self, _operation: &str, _args: &Value) -> Result<Value, ProviderError> {
//!         Ok(json!(["ResetHandler @ 0x1000"]))
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BridgeConfig::default().apply_env()?;
//! config.logging.initialize()?;
//!
//! let server = BridgeServer::new(config);
//! let provider: Arc<dyn ContextProvider> = Arc::new(CodeBrowser);
//! server.attach(provider.clone()).await?;
//!
//! // ... serve requests ...
//!
//! server.detach(&provider).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod provider;
pub mod registry;
pub mod search;
pub mod server;

#[cfg(test)]
mod search_tests;
#[cfg(test)]
mod server_tests;

pub use config::{BridgeConfig, ConfigError};
pub use dispatcher::{CommandDispatcher, CommandWhitelist, WhitelistEntry};
pub use provider::{ContextProvider, ProviderError, ProviderRef, same_provider};
pub use registry::ContextRegistry;
pub use search::{SearchConfig, paginate, search_functions};
pub use server::BridgeServer;

// Re-export the crates a host integration needs alongside the server
pub use hostbridge_logging as logging;
pub use hostbridge_protocol as protocol;
pub use hostbridge_transport as transport;
