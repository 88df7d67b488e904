//! Shared listener lifecycle with real sockets

use crate::test_utils::*;
use assert_matches::assert_matches;
use hostbridge_protocol::BridgeError;
use hostbridge_server::{BridgeServer, ProviderRef};
use hostbridge_transport::{HttpConfig, HttpListener, ManagedListener, SharedServerState};
use reqwest::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn test_ensure_server_binds_once() {
    let (server, shared) = isolated_bridge();
    let first: ProviderRef = TestProvider::new("first", true, true);
    let second: ProviderRef = TestProvider::new("second", true, true);

    let a = server.attach(first.clone()).await.unwrap().unwrap();
    let b = server.attach(second.clone()).await.unwrap().unwrap();

    assert!(a.newly_created);
    assert!(!b.newly_created);
    assert_eq!(a.listener.local_addr(), b.listener.local_addr());
    assert_eq!(shared.interest().await, 2);

    server.shutdown().await;
}

#[tokio::test]
async fn test_listener_stops_with_last_holder() {
    let (server, shared) = isolated_bridge();
    let first: ProviderRef = TestProvider::new("first", true, true);
    let second: ProviderRef = TestProvider::new("second", false, true);

    let base_url = attach_and_url(&server, first.clone()).await;
    server.attach(second.clone()).await.unwrap();
    let client = client();

    server.detach(&first).await;
    let health = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let listener = shared.current().await.unwrap();
    server.detach(&second).await;
    assert!(!shared.is_running().await);

    listener.wait_stopped().await;
    let after = client.get(format!("{base_url}/health")).send().await;
    assert!(after.is_err(), "listener still accepting after last detach");
}

#[tokio::test]
async fn test_bind_failure_leaves_state_retryable() {
    // Occupy a port so the first bind fails.
    let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let taken_port = blocker.local_addr().unwrap().port();

    let shared = Arc::new(SharedServerState::<HttpListener>::new());
    let mut config = test_config();
    config.http.port = taken_port;
    let server = BridgeServer::with_shared_state(config, shared.clone());
    let provider: ProviderRef = TestProvider::new("CodeBrowser", true, true);

    let err = server.attach(provider.clone()).await.unwrap_err();
    assert_matches!(err, BridgeError::Listener(_));
    assert_eq!(err.status_code(), 500);
    assert!(!shared.is_running().await);
    assert_eq!(shared.interest().await, 0);

    drop(blocker);
    let handle = server.attach(provider.clone()).await.unwrap().unwrap();
    assert!(handle.newly_created);
    assert_eq!(handle.listener.local_addr().port(), taken_port);

    server.shutdown().await;
}

#[tokio::test]
async fn test_fast_path_skips_factory_side_effects() {
    let shared = Arc::new(SharedServerState::<HttpListener>::new());
    let server = BridgeServer::with_shared_state(test_config(), shared.clone());
    let owner: ProviderRef = TestProvider::new("owner", true, true);
    let existing = server.attach(owner.clone()).await.unwrap().unwrap();

    let binds = AtomicUsize::new(0);
    let handle = shared
        .ensure_server(0, |_| async {
            binds.fetch_add(1, Ordering::SeqCst);
            HttpListener::bind(
                HttpConfig::default().with_port(0),
                Arc::new(NoopHandler),
                hostbridge_transport::EventHub::new(),
            )
            .await
        })
        .await
        .unwrap();

    assert_eq!(binds.load(Ordering::SeqCst), 0);
    assert!(!handle.newly_created);
    assert!(Arc::ptr_eq(&handle.listener, &existing.listener));

    assert_eq!(shared.release().await, 1);
    server.shutdown().await;
}

#[tokio::test]
async fn test_stop_if_idle_is_idempotent_over_sockets() {
    let (server, shared) = isolated_bridge();
    let provider: ProviderRef = TestProvider::new("CodeBrowser", true, true);
    server.attach(provider.clone()).await.unwrap();

    assert!(!shared.stop_if_idle(false).await);
    assert!(shared.is_running().await);

    assert!(shared.stop_if_idle(true).await);
    assert!(!shared.stop_if_idle(true).await);
    assert!(!shared.stop_if_idle(false).await);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(server.listener_addr().await.is_none());
}

/// Handler for listeners that are never expected to serve
struct NoopHandler;

#[async_trait::async_trait]
impl hostbridge_transport::BridgeHandler for NoopHandler {
    async fn search(
        &self,
        _request: hostbridge_protocol::SearchRequest,
    ) -> hostbridge_protocol::BridgeResult<hostbridge_protocol::PaginatedSearchResponse> {
        Err(BridgeError::internal("unused"))
    }

    async fn dispatch(
        &self,
        _request: hostbridge_protocol::DispatchRequest,
    ) -> hostbridge_protocol::BridgeResult<hostbridge_protocol::DispatchResponse> {
        Err(BridgeError::internal("unused"))
    }

    fn operations(&self) -> Vec<hostbridge_protocol::OperationDescriptor> {
        Vec::new()
    }

    fn context_summary(&self) -> hostbridge_protocol::ContextSummary {
        hostbridge_protocol::ContextSummary::default()
    }
}
