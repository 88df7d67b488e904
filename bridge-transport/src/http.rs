//! Embedded HTTP listener
//!
//! Routes:
//! - `POST /search`     exhaustive search with local pagination
//! - `POST /dispatch`   whitelisted scripting call
//! - `GET  /operations` the allow-list
//! - `GET  /events`     single-subscriber Server-Sent Events stream
//! - `GET  /health`     reachability and context summary

use crate::{
    BridgeHandler, HttpConfig, TransportError,
    events::EventHub,
    listener::ManagedListener,
    stream_guard::{StreamGuard, StreamStatus},
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{any, get, post},
};
use hostbridge_logging::{BridgeMetrics, MetricsSnapshot, get_metrics};
use hostbridge_protocol::{
    BridgeError, ContextSummary, DispatchRequest, ErrorResponse, SearchRequest,
};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};
use tokio::sync::{broadcast::error::RecvError, watch};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, instrument, warn};

/// Error wrapper turning a [`BridgeError`] into an HTTP response
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(ErrorResponse::from(&self.0))).into_response();
        if matches!(self.0, BridgeError::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET"));
        }
        response
    }
}

/// Overall health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// Reachable, but no provider can serve requests
    Degraded,
}

/// Listener section of the health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub listener: ListenerInfo,
    pub context: ContextSummary,
    pub stream: StreamStatus,
    pub metrics: MetricsSnapshot,
}

/// Shared state behind every route
#[derive(Clone)]
pub struct HttpState {
    handler: Arc<dyn BridgeHandler>,
    config: HttpConfig,
    stream_guard: Arc<StreamGuard>,
    events: EventHub,
    metrics: &'static BridgeMetrics,
    started_at: Instant,
    local_addr: Option<SocketAddr>,
}

impl HttpState {
    pub fn new(handler: Arc<dyn BridgeHandler>, config: HttpConfig, events: EventHub) -> Self {
        Self {
            handler,
            config,
            stream_guard: StreamGuard::new(),
            events,
            metrics: get_metrics(),
            started_at: Instant::now(),
            local_addr: None,
        }
    }

    pub fn stream_guard(&self) -> &Arc<StreamGuard> {
        &self.stream_guard
    }

    fn health_report(&self) -> HealthReport {
        let context = self.handler.context_summary();
        HealthReport {
            status: if context.any_active {
                HealthStatus::Ok
            } else {
                HealthStatus::Degraded
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            listener: ListenerInfo {
                address: self.local_addr.map(|addr| addr.to_string()),
            },
            context,
            stream: self.stream_guard.status(),
            metrics: self.metrics.snapshot(),
        }
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, BridgeError> {
    if body.is_empty() {
        return Err(BridgeError::validation("body", "request body is empty"));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Handle `POST /search`
#[instrument(skip_all)]
async fn handle_search(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.record_request();
    let request = SearchRequest::from_json_value(parse_body(&body)?)?;
    debug!("Search request: {:?}", request);

    let response = state.handler.search(request).await?;
    Ok(Json(response))
}

/// Handle `POST /dispatch`
#[instrument(skip_all)]
async fn handle_dispatch(
    State(state): State<Arc<HttpState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    state.metrics.record_request();
    let request: DispatchRequest = parse_body(&body)?;
    debug!("Dispatch request for operation '{}'", request.operation);

    let response = state.handler.dispatch(request).await?;
    Ok(Json(response))
}

/// Handle `GET /operations`
async fn handle_operations(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.handler.operations())
}

/// Handle `GET /health`
async fn handle_health(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.health_report())
}

/// Handle any method on `/events`
async fn handle_events(
    State(state): State<Arc<HttpState>>,
    method: Method,
) -> Result<Response, ApiError> {
    let lease = match state.stream_guard.admit(&method) {
        Ok(lease) => lease,
        Err(e) => {
            if matches!(e, BridgeError::SessionConflict) {
                state.metrics.record_stream_conflict();
            }
            warn!("Event stream request rejected: {}", e);
            return Err(e.into());
        }
    };
    state.metrics.record_stream_opened();

    let session_id = lease.session_id();
    let mut closed_rx: watch::Receiver<bool> = lease.closed_receiver();
    let mut events_rx = state.events.subscribe();

    let stream = async_stream::stream! {
        // Held for the lifetime of the stream; dropping the stream frees the guard.
        let _lease = lease;

        yield Ok::<_, axum::Error>(Event::default()
            .event("connected")
            .data(serde_json::json!({ "session_id": session_id }).to_string()));

        loop {
            if *closed_rx.borrow_and_update() {
                break;
            }

            let received = tokio::select! {
                changed = closed_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = events_rx.recv() => received,
            };

            match received {
                Ok(event) => match Event::default().event(event.kind.as_str()).json_data(&event) {
                    Ok(sse_event) => yield Ok(sse_event),
                    Err(e) => warn!("Failed to encode event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream {} lagged, skipped {} events", session_id, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        debug!("Event stream {} finished", session_id);
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.config.keep_alive_secs))
            .text("keep-alive"),
    );

    let mut response = sse.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
        .headers_mut()
        .insert("X-Accel-Buffering", HeaderValue::from_static("no"));

    Ok(response)
}

/// Build the router for the given state
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = if state.config.enable_cors {
        CorsLayer::very_permissive()
    } else {
        CorsLayer::new()
    };

    // `/events` is added after the layers so a CORS preflight cannot answer
    // for it; every non-GET method there must reach the stream guard.
    Router::new()
        .route("/search", post(handle_search))
        .route("/dispatch", post(handle_dispatch))
        .route("/operations", get(handle_operations))
        .route("/health", get(handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(DefaultBodyLimit::max(state.config.max_body_bytes)),
        )
        .route("/events", any(handle_events))
        .with_state(state)
}

/// A bound and serving HTTP listener
#[derive(Debug)]
pub struct HttpListener {
    local_addr: SocketAddr,
    stream_guard: Arc<StreamGuard>,
    shutdown_tx: watch::Sender<bool>,
    server_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HttpListener {
    /// Bind `config.host:config.port` and start serving
    pub async fn bind(
        config: HttpConfig,
        handler: Arc<dyn BridgeHandler>,
        events: EventHub,
    ) -> Result<Self, TransportError> {
        info!("Starting HTTP listener on {}", config.display_addr());

        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| TransportError::Bind {
                addr: config.display_addr(),
                message: e.to_string(),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let mut state = HttpState::new(handler, config, events);
        state.local_addr = Some(local_addr);
        let stream_guard = state.stream_guard.clone();
        let app = build_router(Arc::new(state));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let server_task = tokio::spawn(async move {
            let shutdown = async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("HTTP listener error: {}", e);
            }
            info!("HTTP listener on {} stopped", local_addr);
        });

        info!("HTTP listener bound to {}", local_addr);
        info!("Endpoints:");
        info!("  POST   http://{}/search      - Paginated function search", local_addr);
        info!("  POST   http://{}/dispatch    - Whitelisted scripting call", local_addr);
        info!("  GET    http://{}/operations  - Allowed operations", local_addr);
        info!("  GET    http://{}/events      - Server-Sent Events", local_addr);
        info!("  GET    http://{}/health      - Health check", local_addr);

        Ok(Self {
            local_addr,
            stream_guard,
            shutdown_tx,
            server_task: Mutex::new(Some(server_task)),
        })
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.stream_guard.status()
    }

    /// Whether the serving task is still alive
    pub fn is_serving(&self) -> bool {
        self.server_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Wait until the serving task has exited
    pub async fn wait_stopped(&self) {
        let task = self
            .server_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("HTTP listener task ended abnormally: {}", e);
            }
        }
    }
}

impl ManagedListener for HttpListener {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn shutdown(&self) {
        self.stream_guard.close();
        self.shutdown_tx.send_replace(true);
    }
}
