//! Request and response models for the bridge HTTP surface

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use validator::Validate;

/// Capability class an operation needs from the active provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRequirement {
    /// Any registered provider may serve the call
    Any,
    /// Only a provider with an open program may serve the call
    Program,
}

impl ContextRequirement {
    pub fn from_requires_program(requires_program: bool) -> Self {
        if requires_program {
            Self::Program
        } else {
            Self::Any
        }
    }

    pub fn requires_program(&self) -> bool {
        matches!(self, Self::Program)
    }
}

impl fmt::Display for ContextRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Program => f.write_str("program"),
        }
    }
}

/// Body of `POST /search`
///
/// Limit and offset are kept signed so that negative values reach
/// validation and are reported against their field name instead of
/// failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "query must not be empty"))]
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    pub limit: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0, message = "offset must not be negative"))]
    pub offset: Option<i64>,
}

static SEARCH_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<name>\S(?:.*\S)?)\s+@\s+0[xX](?P<address>[0-9a-fA-F]+)\s*$")
        .expect("Invalid search line regex")
});

/// One parsed search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultRecord {
    pub name: String,
    /// Always `0x`-prefixed lowercase hexadecimal
    pub address: String,
}

impl SearchResultRecord {
    pub fn new(name: impl Into<String>, address: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            address: normalize_address(address.as_ref()),
        }
    }

    /// Parse a `"<name> @ 0x<hex>"` line. Returns `None` for anything else.
    pub fn parse_line(line: &str) -> Option<Self> {
        let captures = SEARCH_LINE_REGEX.captures(line)?;
        let name = captures.name("name")?.as_str();
        let address = captures.name("address")?.as_str();
        Some(Self::new(name, address))
    }
}

fn normalize_address(address: &str) -> String {
    let digits = address
        .strip_prefix("0x")
        .or_else(|| address.strip_prefix("0X"))
        .unwrap_or(address);
    format!("0x{}", digits.to_ascii_lowercase())
}

/// Response of `POST /search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedSearchResponse {
    pub query: String,
    /// Size of the full result set before slicing
    pub total_results: usize,
    pub page: usize,
    pub limit: usize,
    pub items: Vec<SearchResultRecord>,
    /// Downstream lines that could not be parsed
    #[serde(skip)]
    pub dropped_lines: usize,
}

/// Body of `POST /dispatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub operation: String,
    #[serde(default)]
    pub args: Value,
}

impl DispatchRequest {
    pub fn new(operation: impl Into<String>, args: Value) -> Self {
        Self {
            operation: operation.into(),
            args,
        }
    }
}

/// Response of `POST /dispatch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub operation: String,
    pub result: Value,
}

/// Entry of `GET /operations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub requirement: ContextRequirement,
}

/// Registry view reported by `GET /health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub registered_providers: usize,
    pub any_active: bool,
    pub program_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_provider: Option<String>,
}

/// Kinds of lifecycle events pushed to the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeEventKind {
    ProviderRegistered,
    ProviderUnregistered,
    ProviderPromoted,
    ListenerStarted,
    ListenerStopping,
}

impl BridgeEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderRegistered => "provider_registered",
            Self::ProviderUnregistered => "provider_unregistered",
            Self::ProviderPromoted => "provider_promoted",
            Self::ListenerStarted => "listener_started",
            Self::ListenerStopping => "listener_stopping",
        }
    }
}

/// Lifecycle event published on the event hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub kind: BridgeEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub context: ContextSummary,
    pub timestamp: DateTime<Utc>,
}

impl BridgeEvent {
    pub fn new(kind: BridgeEventKind, provider: Option<String>, context: ContextSummary) -> Self {
        Self {
            kind,
            provider,
            context,
            timestamp: Utc::now(),
        }
    }
}
