//! Integration tests for the hostbridge HTTP bridge
//!
//! Every test starts a real listener on an ephemeral port through its own
//! isolated listener state and talks to it with `reqwest`.

#![allow(unused_imports)] // Allow unused imports in integration tests

pub mod end_to_end_scenarios;
pub mod event_stream_integration;
pub mod http_api_integration;
pub mod listener_lifecycle_integration;

/// Common test utilities for integration tests
pub mod test_utils {
    use hostbridge_server::{
        BridgeConfig, BridgeServer, ContextProvider, ProviderError, ProviderRef,
    };
    use hostbridge_transport::{HttpListener, ManagedListener, SharedServerState};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scriptable stand-in for one attached view of the host
    pub struct TestProvider {
        pub name: String,
        pub program: AtomicBool,
        pub manager: bool,
        pub search_lines: Vec<String>,
        pub calls: AtomicUsize,
    }

    impl TestProvider {
        pub fn new(name: &str, program: bool, manager: bool) -> Arc<Self> {
            Self::with_lines(name, program, manager, &[])
        }

        pub fn with_lines(name: &str, program: bool, manager: bool, lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                program: AtomicBool::new(program),
                manager,
                search_lines: lines.iter().map(|l| l.to_string()).collect(),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn set_program(&self, program: bool) {
            self.program.store(program, Ordering::SeqCst);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ContextProvider for TestProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn has_program_context(&self) -> bool {
            self.program.load(Ordering::SeqCst)
        }

        fn has_program_manager_service(&self) -> bool {
            self.manager
        }

        fn invoke(&self, operation: &str, args: &Value) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match operation {
                "search_functions" => Ok(json!(self.search_lines)),
                "get_version" => Ok(json!({"provider": self.name, "version": "11.0"})),
                "decompile_function" => match args.get("address").and_then(Value::as_str) {
                    Some(address) => Ok(json!(format!("void FUN_{address}(void) {{}}"))),
                    None => Err(ProviderError::failed("missing address")),
                },
                other => Ok(json!({"provider": self.name, "operation": other})),
            }
        }
    }

    /// The lines from the search example: two hits and one malformed line
    pub const RESET_LINES: [&str; 3] = [
        "ResetHandler @ 0x1000",
        "ResetVector @ 0x2000",
        "malformed-line",
    ];

    /// Bridge config bound to an ephemeral port with a fast keep-alive
    pub fn test_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.http.port = 0;
        config.http.keep_alive_secs = 1;
        config
    }

    /// A bridge with its own listener state
    pub fn isolated_bridge() -> (BridgeServer, Arc<SharedServerState<HttpListener>>) {
        let shared = Arc::new(SharedServerState::new());
        (
            BridgeServer::with_shared_state(test_config(), shared.clone()),
            shared,
        )
    }

    /// Attach `provider` (which must own the listener) and return the base URL
    pub async fn attach_and_url(server: &BridgeServer, provider: ProviderRef) -> String {
        let handle = server
            .attach(provider)
            .await
            .expect("attach failed")
            .expect("provider did not acquire the listener");
        format!("http://{}", handle.listener.local_addr())
    }

    /// Bridge with one program-capable provider owning the listener
    pub async fn running_bridge(lines: &[&str]) -> (BridgeServer, Arc<TestProvider>, String) {
        let (server, _shared) = isolated_bridge();
        let provider = TestProvider::with_lines("CodeBrowser", true, true, lines);
        let base_url = attach_and_url(&server, provider.clone()).await;
        (server, provider, base_url)
    }

    pub fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("client")
    }

    /// Wait for a condition with timeout
    pub async fn wait_for_condition<F, Fut>(
        mut condition: F,
        timeout_duration: Duration,
        check_interval: Duration,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout_duration {
            if condition().await {
                return Ok(());
            }
            tokio::time::sleep(check_interval).await;
        }
        Err("Condition timeout".into())
    }

    /// Current stream status as reported by `/health`
    pub async fn stream_status(client: &reqwest::Client, base_url: &str) -> String {
        let health: Value = client
            .get(format!("{base_url}/health"))
            .send()
            .await
            .expect("health request")
            .json()
            .await
            .expect("health body");
        health["stream"].as_str().unwrap_or_default().to_string()
    }
}
