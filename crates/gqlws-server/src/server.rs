//! `GraphQlWsServer`: Axum HTTP + WebSocket binding for connection sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use dashmap::DashMap;
use futures::{SinkExt, Stream, StreamExt, future};
use gqlws_core::Subprotocol;
use gqlws_core::protocol::subprotocol::ADVERTISED;
use gqlws_session::{ConnectionSession, ExecutionGateway, InitHook, Outbound, SessionInfo};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::errors::Result;
use crate::health::{ConnectionEntry, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;

/// Open connections keyed by connection id.
type Connections = DashMap<String, ConnectionEntry>;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    gateway: Arc<dyn ExecutionGateway>,
    init_hook: Option<Arc<dyn InitHook>>,
    connections: Arc<Connections>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

/// The GraphQL over WebSocket server.
pub struct GraphQlWsServer {
    state: AppState,
}

impl GraphQlWsServer {
    /// Create a server executing operations with `gateway`.
    pub fn new(config: ServerConfig, gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self {
            state: AppState {
                config: Arc::new(config),
                gateway,
                init_hook: None,
                connections: Arc::new(DashMap::new()),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Authorize every `connection_init` with `hook`.
    #[must_use]
    pub fn with_init_hook(mut self, hook: Arc<dyn InitHook>) -> Self {
        self.state.init_hook = Some(hook);
        self
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route(&self.state.config.path, get(ws_handler))
            .route("/health", get(health_handler));
        if self.state.metrics.is_some() {
            router = router.route("/metrics", get(metrics_handler));
        }
        router
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Number of open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.state.connections.len()
    }

    /// Bind the listener and serve until shutdown.
    pub async fn listen(self) -> Result<ServerHandle> {
        self.state.config.validate()?;
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        info!(%local_addr, path = %self.state.config.path, "graphql-ws server listening");
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "server stopped with error");
            }
        });

        Ok(ServerHandle {
            local_addr,
            path: self.state.config.path.clone(),
            shutdown_timeout: self.state.config.shutdown_timeout(),
            coordinator: Arc::clone(&self.state.shutdown),
            connections: Arc::clone(&self.state.connections),
            task,
        })
    }
}

/// Handle to a listening server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    path: String,
    shutdown_timeout: std::time::Duration,
    coordinator: Arc<ShutdownCoordinator>,
    connections: Arc<Connections>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL of the GraphQL endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.local_addr, self.path)
    }

    /// `http://` base URL.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Number of open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Close every connection with 1001 and stop accepting new ones.
    pub async fn shutdown(self) {
        self.coordinator
            .graceful_shutdown(vec![self.task], self.shutdown_timeout)
            .await;
    }
}

/// Upgrade request headers as `(name, value)` pairs. Non-UTF-8 values are
/// skipped.
fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_owned(), v.to_owned()))
        })
        .collect()
}

/// Subprotocol the upgrade selected from [`ADVERTISED`], as returned by
/// [`WebSocket::protocol`].
fn selected_subprotocol(selected: Option<&HeaderValue>) -> Option<Subprotocol> {
    selected
        .and_then(|value| value.to_str().ok())
        .and_then(Subprotocol::resolve)
}

/// GET `<path>`: WebSocket upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    uri: Uri,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let info = SessionInfo::new(uri.to_string()).with_headers(header_pairs(&headers));
    ws.protocols(ADVERTISED)
        .max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            let info = info.with_subprotocol(selected_subprotocol(socket.protocol()));
            run_socket(socket, info, state)
        })
}

/// Text of one inbound WebSocket message; control frames yield nothing.
fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                None
            }
        },
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Inbound text stream that ends at the client's close frame or a read
/// error.
fn inbound_text<S>(socket: S) -> impl Stream<Item = String> + Send + Unpin
where
    S: Stream<Item = std::result::Result<Message, axum::Error>> + Send + Unpin,
{
    socket
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| future::ready(msg.ok().and_then(message_text)))
}

/// Forward session output to the socket until a close item or channel end.
async fn write_outbound<W>(mut ws_tx: W, mut outbound: mpsc::Receiver<Outbound>)
where
    W: futures::Sink<Message> + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Text(text) => {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close(status) => {
                let frame = CloseFrame {
                    code: status.code,
                    reason: status.reason.into(),
                };
                let _ = ws_tx.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
    let _ = ws_tx.close().await;
}

/// Run one upgraded connection to completion.
async fn run_socket(socket: WebSocket, info: SessionInfo, state: AppState) {
    let (ws_tx, ws_rx) = socket.split();

    let mut builder = ConnectionSession::builder(Arc::clone(&state.gateway))
        .info(info)
        .config(state.config.session_config())
        .shutdown(state.shutdown.token());
    if let Some(hook) = &state.init_hook {
        builder = builder.init_hook(Arc::clone(hook));
    }
    let (session, outbound) = builder.build();
    let connection_id = session.info().connection_id.clone();
    let entry = ConnectionEntry {
        info: Arc::clone(session.info()),
        registry: Arc::clone(session.registry()),
    };
    let _ = state.connections.insert(connection_id.clone(), entry);

    let writer = tokio::spawn(write_outbound(ws_tx, outbound));
    let end = session.run(inbound_text(ws_rx)).await;
    let _ = state.connections.remove(&connection_id);

    if let Err(e) = writer.await {
        warn!(connection_id, error = %e, "socket writer failed");
    }
    debug!(connection_id, ?end, "socket finished");
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let loads = state.connections.iter().map(|entry| entry.value().load());
    Json(HealthResponse::snapshot(state.start_time, loads))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gqlws_core::ExecutionResult;
    use gqlws_session::{ExecutionOutput, gateway_fn};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> GraphQlWsServer {
        let gateway = gateway_fn(|_| async {
            Ok(ExecutionOutput::Single(ExecutionResult::data(
                serde_json::json!(null),
            )))
        });
        GraphQlWsServer::new(ServerConfig::default(), Arc::new(gateway))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, body) = get(make_server().router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["awaiting_init"], 0);
        assert_eq!(parsed["active_operations"], 0);
    }

    #[tokio::test]
    async fn metrics_route_only_when_configured() {
        let (status, _) = get(make_server().router(), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let handle = PrometheusBuilder::new().build_recorder().handle();
        let server = make_server().with_metrics(handle);
        let (status, _) = get(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn graphql_path_requires_upgrade() {
        let (status, _) = get(make_server().router(), "/graphql").await;
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn subprotocol_from_upgrade_selection() {
        assert_eq!(selected_subprotocol(None), None);
        assert_eq!(
            selected_subprotocol(Some(&HeaderValue::from_static("graphql-transport-ws"))),
            Some(Subprotocol::GraphQlTransportWs)
        );
        assert_eq!(
            selected_subprotocol(Some(&HeaderValue::from_static("subscriptions-transport-ws"))),
            Some(Subprotocol::Legacy)
        );
        assert_eq!(
            selected_subprotocol(Some(&HeaderValue::from_static("chat"))),
            None
        );
    }

    #[test]
    fn header_pairs_skip_non_utf8() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-tenant", HeaderValue::from_static("t1"));
        let _ = headers.insert("x-raw", HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap());
        let pairs = header_pairs(&headers);
        assert_eq!(pairs, vec![("x-tenant".to_owned(), "t1".to_owned())]);
    }

    #[test]
    fn binary_utf8_is_text() {
        assert_eq!(
            message_text(Message::Binary(b"{}".to_vec().into())),
            Some("{}".to_owned())
        );
        assert_eq!(message_text(Message::Binary(vec![0xff].into())), None);
        assert_eq!(message_text(Message::Ping(Vec::new().into())), None);
    }

    #[tokio::test]
    async fn shutdown_coordinator_accessible() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.config().path, "/graphql");
    }
}
