//! Process-wide lifecycle of the embedded HTTP listener
//!
//! Several extension instances inside one host process may each ask for a
//! listener. [`SharedServerState`] makes sure exactly one exists: the first
//! caller's factory binds it, every later caller gets the same instance
//! back without its factory ever running. An interest count tracks how many
//! callers still need it, and [`SharedServerState::stop_if_idle`] only tears
//! it down once that count reaches zero (or when forced).

use crate::http::HttpListener;
use once_cell::sync::Lazy;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A listener that can be owned by [`SharedServerState`]
pub trait ManagedListener: Send + Sync + 'static {
    fn local_addr(&self) -> SocketAddr;

    /// Begin shutdown. Must tolerate being called more than once.
    fn shutdown(&self);
}

/// Listener returned from [`SharedServerState::ensure_server`]
#[derive(Debug)]
pub struct ServerHandle<L> {
    pub listener: Arc<L>,
    /// `true` only for the call whose factory created the listener
    pub newly_created: bool,
}

impl<L> Clone for ServerHandle<L> {
    fn clone(&self) -> Self {
        Self {
            listener: self.listener.clone(),
            newly_created: self.newly_created,
        }
    }
}

struct SharedInner<L> {
    listener: Option<Arc<L>>,
    interest: usize,
}

/// Holder of at most one listener plus its interest count
pub struct SharedServerState<L> {
    inner: Mutex<SharedInner<L>>,
}

impl<L: ManagedListener> SharedServerState<L> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SharedInner {
                listener: None,
                interest: 0,
            }),
        }
    }

    /// Return the existing listener, or create one with `factory`
    ///
    /// The existence check and the factory call happen under one lock, so two
    /// concurrent callers can never both bind. A failing factory leaves the
    /// state empty and the next call retries. Each successful call counts as
    /// one unit of interest; pair it with [`release`](Self::release).
    pub async fn ensure_server<F, Fut, E>(
        &self,
        port: u16,
        factory: F,
    ) -> Result<ServerHandle<L>, E>
    where
        F: FnOnce(u16) -> Fut,
        Fut: Future<Output = Result<L, E>>,
    {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = &inner.listener {
            let listener = existing.clone();
            inner.interest += 1;
            debug!(
                "Reusing listener on {} (requested port {}, interest {})",
                listener.local_addr(),
                port,
                inner.interest
            );
            return Ok(ServerHandle {
                listener,
                newly_created: false,
            });
        }

        let listener = Arc::new(factory(port).await?);
        inner.listener = Some(listener.clone());
        inner.interest += 1;
        info!("Created shared listener on {}", listener.local_addr());

        Ok(ServerHandle {
            listener,
            newly_created: true,
        })
    }

    /// Register one more unit of interest in an existing listener
    pub async fn retain(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.listener.is_some() {
            inner.interest += 1;
            true
        } else {
            false
        }
    }

    /// Drop one unit of interest. Never tears anything down by itself.
    pub async fn release(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.interest = inner.interest.saturating_sub(1);
        inner.interest
    }

    /// Shut the listener down if nobody needs it, or unconditionally with
    /// `force`. Returns whether a listener was stopped by this call.
    pub async fn stop_if_idle(&self, force: bool) -> bool {
        self.stop_if_idle_with(force, |_| {}).await
    }

    /// Like [`stop_if_idle`](Self::stop_if_idle), running `before_stop` on
    /// the listener once the decision to stop is made. The decision and the
    /// callback share one critical section, so no `retain` or
    /// `ensure_server` can slip in between them.
    pub async fn stop_if_idle_with<F>(&self, force: bool, before_stop: F) -> bool
    where
        F: FnOnce(&L),
    {
        let mut inner = self.inner.lock().await;

        if inner.listener.is_none() {
            return false;
        }
        if !force && inner.interest > 0 {
            debug!(
                "Listener still required by {} holder(s), keeping it",
                inner.interest
            );
            return false;
        }

        inner.interest = 0;
        match inner.listener.take() {
            Some(listener) => {
                info!(
                    "Stopping shared listener on {} (forced: {})",
                    listener.local_addr(),
                    force
                );
                before_stop(&listener);
                listener.shutdown();
                true
            }
            None => false,
        }
    }

    pub async fn current(&self) -> Option<Arc<L>> {
        self.inner.lock().await.listener.clone()
    }

    pub async fn interest(&self) -> usize {
        self.inner.lock().await.interest
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.listener.is_some()
    }
}

impl<L: ManagedListener> Default for SharedServerState<L> {
    fn default() -> Self {
        Self::new()
    }
}

static SHARED_HTTP_STATE: Lazy<Arc<SharedServerState<HttpListener>>> =
    Lazy::new(|| Arc::new(SharedServerState::new()));

/// The process-wide listener state for the HTTP bridge
pub fn shared_http_state() -> Arc<SharedServerState<HttpListener>> {
    SHARED_HTTP_STATE.clone()
}
