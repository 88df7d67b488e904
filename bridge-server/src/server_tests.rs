//! Tests for the attach/detach façade

#[cfg(test)]
mod tests {
    use crate::config::BridgeConfig;
    use crate::provider::{ContextProvider, ProviderError, ProviderRef};
    use crate::server::BridgeServer;
    use hostbridge_protocol::{BridgeEventKind, SearchRequest};
    use hostbridge_transport::{HttpListener, ManagedListener, SharedServerState};
    use serde_json::{Value, json};
    use std::sync::Arc;

    struct View {
        name: &'static str,
        program: bool,
        manager: bool,
    }

    impl ContextProvider for View {
        fn name(&self) -> &str {
            self.name
        }

        fn has_program_context(&self) -> bool {
            self.program
        }

        fn has_program_manager_service(&self) -> bool {
            self.manager
        }

        fn invoke(&self, operation: &str, _args: &Value) -> Result<Value, ProviderError> {
            match operation {
                "search_functions" => Ok(json!("ResetHandler @ 0x1000\nResetVector @ 0x2000")),
                _ => Ok(json!(self.name)),
            }
        }
    }

    fn view(name: &'static str, program: bool, manager: bool) -> ProviderRef {
        Arc::new(View {
            name,
            program,
            manager,
        })
    }

    fn isolated_server() -> (BridgeServer, Arc<SharedServerState<HttpListener>>) {
        let mut config = BridgeConfig::default();
        config.http.port = 0;
        let shared = Arc::new(SharedServerState::new());
        (BridgeServer::with_shared_state(config, shared.clone()), shared)
    }

    #[tokio::test]
    async fn test_first_manager_attach_starts_listener() {
        let (server, shared) = isolated_server();
        let browser = view("CodeBrowser", true, true);

        let handle = server.attach(browser.clone()).await.unwrap().unwrap();
        assert!(handle.newly_created);
        assert!(shared.is_running().await);
        assert_eq!(server.listener_addr().await, Some(handle.listener.local_addr()));
        assert_eq!(shared.interest().await, 1);

        let described = format!("{handle:?}");
        assert!(described.contains("HttpListener"));
        assert!(described.contains(&handle.listener.local_addr().to_string()));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_second_attach_reuses_listener() {
        let (server, shared) = isolated_server();
        let first = view("first", true, true);
        let second = view("second", true, true);

        let a = server.attach(first.clone()).await.unwrap().unwrap();
        let b = server.attach(second.clone()).await.unwrap().unwrap();

        assert!(a.newly_created);
        assert!(!b.newly_created);
        assert!(Arc::ptr_eq(&a.listener, &b.listener));
        assert_eq!(shared.interest().await, 2);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_reattach_takes_interest_once() {
        let (server, shared) = isolated_server();
        let browser = view("CodeBrowser", true, true);

        assert!(server.attach(browser.clone()).await.unwrap().is_some());
        assert!(server.attach(browser.clone()).await.unwrap().is_none());
        assert_eq!(shared.interest().await, 1);
        assert_eq!(server.registry().len(), 1);

        assert!(server.detach(&browser).await);
        assert!(!shared.is_running().await);
    }

    #[tokio::test]
    async fn test_listener_outlives_all_but_last_holder() {
        let (server, shared) = isolated_server();
        let first = view("first", true, true);
        let second = view("second", false, true);

        server.attach(first.clone()).await.unwrap();
        server.attach(second.clone()).await.unwrap();

        assert!(server.detach(&first).await);
        assert!(shared.is_running().await);

        assert!(server.detach(&second).await);
        assert!(!shared.is_running().await);
        assert!(server.listener_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_provider_without_manager_service_never_binds() {
        let (server, shared) = isolated_server();
        let viewer = view("Viewer", true, false);

        assert!(server.attach(viewer.clone()).await.unwrap().is_none());
        assert!(!shared.is_running().await);
        assert!(server.context_summary().program_active);

        assert!(server.detach(&viewer).await);
        assert!(!server.detach(&viewer).await);
    }

    #[tokio::test]
    async fn test_shutdown_ignores_remaining_interest() {
        let (server, shared) = isolated_server();
        let browser = view("CodeBrowser", true, true);
        let handle = server.attach(browser.clone()).await.unwrap().unwrap();

        assert!(server.shutdown().await);
        assert!(!shared.is_running().await);
        assert_eq!(shared.interest().await, 0);
        handle.listener.wait_stopped().await;
        assert!(!handle.listener.is_serving());

        assert!(!server.shutdown().await);
        // Providers stay registered; only the listener is gone.
        assert_eq!(server.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_events_published_for_lifecycle() {
        let (server, _shared) = isolated_server();
        let mut rx = server.events().subscribe();
        let browser = view("CodeBrowser", true, true);
        let project = view("ProjectManager", false, false);

        server.attach(browser.clone()).await.unwrap();
        server.attach(project.clone()).await.unwrap();
        assert!(server.promote(&browser));
        server.detach(&browser).await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }

        assert_eq!(
            kinds,
            vec![
                BridgeEventKind::ProviderRegistered,
                BridgeEventKind::ListenerStarted,
                BridgeEventKind::ProviderRegistered,
                BridgeEventKind::ProviderPromoted,
                BridgeEventKind::ProviderUnregistered,
                BridgeEventKind::ListenerStopping,
            ]
        );
    }

    #[tokio::test]
    async fn test_stopping_published_only_when_listener_stops() {
        let (server, shared) = isolated_server();
        let first = view("first", true, true);
        let second = view("second", false, true);
        server.attach(first.clone()).await.unwrap();
        server.attach(second.clone()).await.unwrap();

        let mut rx = server.events().subscribe();
        server.detach(&first).await;
        assert!(shared.is_running().await);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(kinds, vec![BridgeEventKind::ProviderUnregistered]);

        server.detach(&second).await;
        assert!(!shared.is_running().await);
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                BridgeEventKind::ProviderUnregistered,
                BridgeEventKind::ListenerStopping,
            ]
        );

        assert!(!server.shutdown().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_promote_unknown_publishes_nothing() {
        let (server, _shared) = isolated_server();
        let mut rx = server.events().subscribe();

        assert!(!server.promote(&view("stranger", true, false)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_search_and_dispatch_through_server() {
        let (server, _shared) = isolated_server();
        server
            .attach(view("CodeBrowser", true, false))
            .await
            .unwrap();

        let response = server
            .search(SearchRequest {
                query: "Reset".to_string(),
                limit: Some(1),
                offset: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(response.total_results, 2);
        assert_eq!(response.page, 2);
        assert_eq!(response.items[0].name, "ResetVector");

        let version = server.dispatch("get_version", Value::Null).await.unwrap();
        assert_eq!(version, json!("CodeBrowser"));
    }
}
