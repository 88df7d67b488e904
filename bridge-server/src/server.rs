//! Attach/detach façade tying the registry to the shared listener
//!
//! One [`BridgeServer`] serves a host process. Each extension instance
//! attaches its provider when its view opens and detaches it when the view
//! closes; providers that may own the listener keep it alive while attached.

use crate::config::BridgeConfig;
use crate::dispatcher::CommandDispatcher;
use crate::provider::{ProviderRef, same_provider};
use crate::registry::ContextRegistry;
use crate::search::search_functions;
use async_trait::async_trait;
use hostbridge_protocol::{
    BridgeError, BridgeEvent, BridgeEventKind, BridgeResult, ContextSummary, DispatchRequest,
    DispatchResponse, OperationDescriptor, PaginatedSearchResponse, SearchRequest,
};
use hostbridge_transport::{
    BridgeHandler, EventHub, HttpListener, ManagedListener, ServerHandle, SharedServerState,
    shared_http_state,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct BridgeInner {
    config: BridgeConfig,
    registry: Arc<ContextRegistry>,
    dispatcher: CommandDispatcher,
    events: EventHub,
    shared: Arc<SharedServerState<HttpListener>>,
    /// Providers currently holding one unit of listener interest each
    interest_holders: Mutex<Vec<ProviderRef>>,
}

impl BridgeInner {
    fn publish(&self, kind: BridgeEventKind, provider: Option<&ProviderRef>) {
        let event = BridgeEvent::new(
            kind,
            provider.map(|p| p.name().to_string()),
            self.registry.summary(),
        );
        let delivered = self.events.publish(event);
        debug!("Published {} to {} subscriber(s)", kind.as_str(), delivered);
    }
}

#[async_trait]
impl BridgeHandler for BridgeInner {
    async fn search(&self, request: SearchRequest) -> BridgeResult<PaginatedSearchResponse> {
        search_functions(&self.dispatcher, &self.config.search, request).await
    }

    async fn dispatch(&self, request: DispatchRequest) -> BridgeResult<DispatchResponse> {
        self.dispatcher.dispatch_request(request).await
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        self.dispatcher.whitelist().descriptors()
    }

    fn context_summary(&self) -> ContextSummary {
        self.registry.summary()
    }
}

/// Process-level entry point of the bridge
#[derive(Clone)]
pub struct BridgeServer {
    inner: Arc<BridgeInner>,
}

impl BridgeServer {
    /// Bridge using the process-wide listener state
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_shared_state(config, shared_http_state())
    }

    /// Bridge using an explicit listener state
    pub fn with_shared_state(
        config: BridgeConfig,
        shared: Arc<SharedServerState<HttpListener>>,
    ) -> Self {
        let registry = Arc::new(ContextRegistry::new());
        let dispatcher = CommandDispatcher::new(registry.clone(), config.command_whitelist());

        Self {
            inner: Arc::new(BridgeInner {
                config,
                registry,
                dispatcher,
                events: EventHub::new(),
                shared,
                interest_holders: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.inner.registry
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.inner.dispatcher
    }

    pub fn events(&self) -> &EventHub {
        &self.inner.events
    }

    /// Register `provider` and, if it may own the listener, acquire it
    ///
    /// Returns the listener handle when one was acquired by this call. A
    /// provider already holding interest does not acquire it a second time.
    ///
    /// # Errors
    ///
    /// `Listener` when the listener had to be created and binding failed.
    /// The provider stays registered; a later attach retries the bind.
    pub async fn attach(
        &self,
        provider: ProviderRef,
    ) -> BridgeResult<Option<ServerHandle<HttpListener>>> {
        let inner = &self.inner;
        inner.registry.register(provider.clone());
        inner.publish(BridgeEventKind::ProviderRegistered, Some(&provider));

        if !provider.has_program_manager_service() {
            debug!(
                "Provider '{}' cannot own the listener, not acquiring it",
                provider.name()
            );
            return Ok(None);
        }

        let mut holders = inner.interest_holders.lock().await;
        if holders.iter().any(|p| same_provider(p, &provider)) {
            debug!("Provider '{}' already holds the listener", provider.name());
            return Ok(None);
        }

        let http_config = inner.config.http.clone();
        let handler: Arc<dyn BridgeHandler> = inner.clone();
        let events = inner.events.clone();

        let handle = inner
            .shared
            .ensure_server(http_config.port, |port| {
                HttpListener::bind(http_config.with_port(port), handler, events)
            })
            .await
            .map_err(BridgeError::from)?;

        holders.push(provider.clone());
        drop(holders);

        if handle.newly_created {
            info!(
                "Provider '{}' started the bridge listener on {}",
                provider.name(),
                handle.listener.local_addr()
            );
            inner.publish(BridgeEventKind::ListenerStarted, Some(&provider));
        }

        Ok(Some(handle))
    }

    /// Unregister `provider`, release its listener interest and stop the
    /// listener if nobody else needs it. Returns whether it was registered.
    pub async fn detach(&self, provider: &ProviderRef) -> bool {
        let inner = &self.inner;
        let was_registered = inner.registry.unregister(provider);
        if was_registered {
            inner.publish(BridgeEventKind::ProviderUnregistered, Some(provider));
        }

        let mut holders = inner.interest_holders.lock().await;
        if let Some(index) = holders.iter().position(|p| same_provider(p, provider)) {
            holders.remove(index);
            let remaining = inner.shared.release().await;
            debug!(
                "Provider '{}' released the listener ({} holder(s) left)",
                provider.name(),
                remaining
            );
        }

        let stopped = inner
            .shared
            .stop_if_idle_with(false, |_| {
                inner.publish(BridgeEventKind::ListenerStopping, Some(provider));
            })
            .await;
        if stopped {
            info!("Bridge listener stopped after '{}' detached", provider.name());
        }

        was_registered
    }

    /// Make `provider` the most recent one. Returns whether it was registered.
    pub fn promote(&self, provider: &ProviderRef) -> bool {
        let promoted = self.inner.registry.promote(provider);
        if promoted {
            self.inner
                .publish(BridgeEventKind::ProviderPromoted, Some(provider));
        }
        promoted
    }

    /// Tear the listener down regardless of remaining interest
    pub async fn shutdown(&self) -> bool {
        let inner = &self.inner;
        let mut holders = inner.interest_holders.lock().await;
        holders.clear();

        let stopped = inner
            .shared
            .stop_if_idle_with(true, |_| {
                inner.publish(BridgeEventKind::ListenerStopping, None);
            })
            .await;
        if stopped {
            info!("Bridge listener shut down");
        } else {
            debug!("Shutdown requested but no listener was running");
        }
        stopped
    }

    /// Address of the shared listener, if one is running
    pub async fn listener_addr(&self) -> Option<SocketAddr> {
        self.inner
            .shared
            .current()
            .await
            .map(|listener| listener.local_addr())
    }

    pub async fn search(&self, request: SearchRequest) -> BridgeResult<PaginatedSearchResponse> {
        self.inner.search(request).await
    }

    pub async fn dispatch(&self, operation: &str, args: Value) -> BridgeResult<Value> {
        self.inner.dispatcher.dispatch(operation, args).await
    }

    pub fn context_summary(&self) -> ContextSummary {
        self.inner.registry.summary()
    }
}
