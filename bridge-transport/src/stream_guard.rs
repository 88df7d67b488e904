//! Single-subscriber guard for the `/events` stream
//!
//! State machine: `Idle -> Streaming -> Idle`, plus a terminal `Closed`
//! entered when the listener shuts down.
//!
//! - `GET` while `Idle` opens a session and hands out a [`StreamLease`]
//! - `GET` while `Streaming` is a [`BridgeError::SessionConflict`]
//! - `GET` while `Closed` is a [`BridgeError::StreamClosed`]
//! - any other method is a [`BridgeError::MethodNotAllowed`], in every state
//!
//! Dropping the lease (client disconnect, stream error, shutdown) returns
//! the guard to `Idle`. The check-and-transition runs under one lock.

use axum::http::Method;
use chrono::{DateTime, Utc};
use hostbridge_protocol::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamState {
    Idle,
    Streaming {
        session_id: Uuid,
        opened_at: DateTime<Utc>,
    },
    Closed,
}

/// Externally visible guard state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Idle,
    Streaming,
    Closed,
}

/// Guard enforcing at most one open event stream
#[derive(Debug)]
pub struct StreamGuard {
    state: Mutex<StreamState>,
    closed_tx: watch::Sender<bool>,
}

impl StreamGuard {
    pub fn new() -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            state: Mutex::new(StreamState::Idle),
            closed_tx,
        })
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a request may open the stream
    ///
    /// # Errors
    ///
    /// `MethodNotAllowed` for non-GET, `SessionConflict` while a session is
    /// open, `StreamClosed` after shutdown.
    pub fn admit(self: &Arc<Self>, method: &Method) -> BridgeResult<StreamLease> {
        if method != Method::GET {
            return Err(BridgeError::method_not_allowed(method.as_str()));
        }

        let mut state = self.lock();
        match &*state {
            StreamState::Idle => {
                let session_id = Uuid::new_v4();
                *state = StreamState::Streaming {
                    session_id,
                    opened_at: Utc::now(),
                };
                info!("Event stream session {} opened", session_id);
                Ok(StreamLease {
                    guard: self.clone(),
                    session_id,
                    closed_rx: self.closed_tx.subscribe(),
                })
            }
            StreamState::Streaming { session_id, .. } => {
                debug!("Rejecting stream request, session {} is active", session_id);
                Err(BridgeError::SessionConflict)
            }
            StreamState::Closed => Err(BridgeError::StreamClosed),
        }
    }

    /// Enter the terminal state and end any open session
    pub fn close(&self) {
        *self.lock() = StreamState::Closed;
        self.closed_tx.send_replace(true);
    }

    pub fn status(&self) -> StreamStatus {
        match &*self.lock() {
            StreamState::Idle => StreamStatus::Idle,
            StreamState::Streaming { .. } => StreamStatus::Streaming,
            StreamState::Closed => StreamStatus::Closed,
        }
    }

    /// When the current session was opened, if one is open
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        match &*self.lock() {
            StreamState::Streaming { opened_at, .. } => Some(*opened_at),
            _ => None,
        }
    }

    fn release(&self, released: Uuid) {
        let mut state = self.lock();
        let is_current = matches!(
            &*state,
            StreamState::Streaming { session_id, .. } if *session_id == released
        );
        if is_current {
            *state = StreamState::Idle;
            info!("Event stream session {} closed", released);
        }
    }
}

/// Proof of the one open session; dropping it frees the guard
#[derive(Debug)]
pub struct StreamLease {
    guard: Arc<StreamGuard>,
    session_id: Uuid,
    closed_rx: watch::Receiver<bool>,
}

impl StreamLease {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Receiver flipping to `true` when the guard is closed
    pub fn closed_receiver(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.guard.release(self.session_id);
    }
}
