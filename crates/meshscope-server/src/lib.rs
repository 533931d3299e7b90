//! HTTP and websocket API for meshscope.
//!
//! Probes `POST` reports to `/api/report`; the UI reads rendered views,
//! node details and live diff streams under `/api/topology`, invokes
//! controls under `/api/control` and attaches to pipes under `/api/pipe`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt, future};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use meshscope_core::{DetailedNode, RenderableNodes, Report, ReportError, Store, View};

pub mod control;
pub mod pipe;
pub mod stream;

pub use control::{ControlError, ControlHandler, ControlRequest, ControlResponse, ControlRouter, ProbeConnection};
pub use pipe::{Pipe, PipeError, PipeRegistry};
pub use stream::{StreamConfig, StreamError, stream_topology};

/// Header a probe sends when opening its control websocket.
pub const PROBE_ID_HEADER: &str = "x-meshscope-probe-id";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted report body, compressed or not.
    pub max_report_bytes: usize,
    pub stream: StreamConfig,
    /// Pipes no UI attaches to within this long are closed.
    pub pipe_attach_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4040,
            max_report_bytes: 64 * 1024 * 1024,
            stream: StreamConfig::default(),
            pipe_attach_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared server state.
pub struct AppState {
    pub store: Arc<Store>,
    pub controls: ControlRouter,
    /// Shared with in-process control handlers that open pipes.
    pub pipes: Arc<PipeRegistry>,
    pub config: ServerConfig,
    /// Cancelled on shutdown; ends every open stream.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Self::with_store(config, Arc::new(Store::new()))
    }

    pub fn with_store(config: ServerConfig, store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            store,
            controls: ControlRouter::new(),
            pipes: Arc::new(PipeRegistry::new()),
            config,
            shutdown: CancellationToken::new(),
        })
    }
}

type ApiError = (StatusCode, String);

fn parse_view(name: &str) -> Result<View, ApiError> {
    name.parse().map_err(|e| (StatusCode::NOT_FOUND, e))
}

// ---------------------------------------------------------------------------
// Index and health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    nodes: usize,
    merges: u64,
    subscribers: usize,
    probes: usize,
}

async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "meshscope",
        "version": meshscope_core::VERSION,
        "views": View::ALL.iter().map(|v| v.name()).collect::<Vec<_>>(),
        "endpoints": {
            "/": "This API index",
            "/health": "Health check",
            "/api/report": {
                "GET": "Current merged report",
                "POST": "Submit a report (JSON, optionally gzip-compressed)",
            },
            "/api/topology": "Views with node counts",
            "/api/topology/{view}": "Rendered view",
            "/api/topology/{view}/ws?t=1s": "Websocket stream of diffs",
            "/api/topology/{view}/{id}": "Node details",
            "/api/control/ws": format!("Probe control websocket (requires {PROBE_ID_HEADER})"),
            "/api/control/{probe}/{node}/{control}": "Invoke a control (POST)",
            "/api/pipe/{id}": "Attach to a pipe (websocket) or close it (DELETE)",
        },
    }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: meshscope_core::VERSION,
        nodes: state.store.report().node_count(),
        merges: state.store.version(),
        subscribers: state.store.subscriber_count(),
        probes: state.controls.probes().await.len(),
    })
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Gzip bodies are recognised by their magic bytes, so a missing
/// `Content-Encoding` header does not matter. The size limit applies to the
/// decompressed report too.
async fn handle_report_post(State(state): State<Arc<AppState>>, body: Bytes) -> Result<StatusCode, ApiError> {
    let report = Report::from_slice_limited(&body, state.config.max_report_bytes).map_err(|e| {
        log::warn!("rejected report ({} bytes): {e}", body.len());
        let status = match e {
            ReportError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, e.to_string())
    })?;
    state.store.submit(&report);
    Ok(StatusCode::OK)
}

async fn handle_report_get(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bytes = state
        .store
        .report()
        .to_vec()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes).into_response())
}

// ---------------------------------------------------------------------------
// Topologies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct TopologyStats {
    node_count: usize,
    nonpseudo_node_count: usize,
    edge_count: usize,
}

#[derive(Serialize)]
struct TopologyDesc {
    name: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sub_topologies: Vec<TopologyDesc>,
    stats: TopologyStats,
}

fn describe(view: View, rpt: &Report) -> TopologyDesc {
    let nodes = view.render(rpt);
    TopologyDesc {
        name: view.label(),
        url: format!("/api/topology/{view}"),
        sub_topologies: View::ALL
            .into_iter()
            .filter(|v| v.parent() == Some(view))
            .map(|v| describe(v, rpt))
            .collect(),
        stats: TopologyStats {
            node_count: nodes.len(),
            nonpseudo_node_count: nodes.values().filter(|n| !n.pseudo).count(),
            edge_count: nodes.values().map(|n| n.adjacency().len()).sum(),
        },
    }
}

async fn handle_topologies(State(state): State<Arc<AppState>>) -> Json<Vec<TopologyDesc>> {
    let rpt = state.store.report();
    Json(
        View::ALL
            .into_iter()
            .filter(|v| v.parent().is_none())
            .map(|v| describe(v, &rpt))
            .collect(),
    )
}

#[derive(Serialize)]
struct ApiTopology {
    nodes: RenderableNodes,
}

async fn handle_topology(
    State(state): State<Arc<AppState>>,
    Path(view): Path<String>,
) -> Result<Json<ApiTopology>, ApiError> {
    let view = parse_view(&view)?;
    Ok(Json(ApiTopology {
        nodes: view.render(&state.store.report()).prune(),
    }))
}

#[derive(Serialize)]
struct ApiNode {
    node: DetailedNode,
}

async fn handle_node(
    State(state): State<Arc<AppState>>,
    Path((view, id)): Path<(String, String)>,
) -> Result<Json<ApiNode>, ApiError> {
    let view = parse_view(&view)?;
    let rpt = state.store.report();
    let nodes = view.render(&rpt);
    let node = nodes
        .get(&id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("node {id} not found in {view}")))?;
    Ok(Json(ApiNode {
        node: DetailedNode::make(&rpt, node),
    }))
}

#[derive(Deserialize)]
struct WsParams {
    /// Re-render interval, e.g. `500ms` or `2s`.
    t: Option<String>,
}

async fn handle_topology_ws(
    State(state): State<Arc<AppState>>,
    Path(view): Path<String>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let view = parse_view(&view)?;
    let mut config = state.config.stream;
    if let Some(t) = params.t {
        let interval =
            humantime::parse_duration(&t).map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid t={t}: {e}")))?;
        if interval.is_zero() {
            return Err((StatusCode::BAD_REQUEST, "t must be positive".to_string()));
        }
        config.interval = interval;
    }
    Ok(ws.on_upgrade(move |socket| serve_topology_socket(socket, state, view, config)))
}

async fn serve_topology_socket(socket: WebSocket, state: Arc<AppState>, view: View, config: StreamConfig) {
    let (sink, stream) = socket.split();
    let sink = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let incoming = stream.take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))));
    log::debug!("{view}: websocket opened");
    if let Err(e) = stream_topology(sink, incoming, &state.store, view, &config, state.shutdown.clone()).await {
        log::info!("{view}: websocket closed: {e}");
    }
}

// ---------------------------------------------------------------------------
// Controls
// ---------------------------------------------------------------------------

async fn handle_control(
    State(state): State<Arc<AppState>>,
    Path((probe_id, node_id, control)): Path<(String, String, String)>,
) -> (StatusCode, Json<ControlResponse>) {
    let req = ControlRequest {
        probe_id,
        node_id,
        control,
    };
    match state.controls.handle(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)),
        Err(e @ ControlError::NoHandler(_)) => (StatusCode::NOT_FOUND, Json(ControlResponse::error(e))),
        Err(e) => {
            log::warn!("control failed: {e}");
            (StatusCode::BAD_GATEWAY, Json(ControlResponse::error(e)))
        }
    }
}

async fn handle_probe_ws(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let probe_id = headers
        .get(PROBE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("missing {PROBE_ID_HEADER} header")))?
        .to_string();
    Ok(ws.on_upgrade(move |socket| serve_probe_socket(socket, state, probe_id)))
}

async fn serve_probe_socket(socket: WebSocket, state: Arc<AppState>, probe_id: String) {
    let (handler, conn) = ProbeConnection::new(probe_id.clone());
    let handler: Arc<dyn ControlHandler> = Arc::new(handler);
    state.controls.register(probe_id.clone(), Arc::clone(&handler)).await;

    let (sink, stream) = socket.split();
    let sink = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));
    let incoming = stream
        .take_while(|msg| future::ready(matches!(msg, Ok(m) if !matches!(m, Message::Close(_)))))
        .filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(text.as_str().to_owned()),
                _ => None,
            })
        });

    tokio::select! {
        _ = conn.run(sink, incoming) => {}
        _ = state.shutdown.cancelled() => {}
    }
    state.controls.deregister(&probe_id, &handler).await;
}

// ---------------------------------------------------------------------------
// Pipes
// ---------------------------------------------------------------------------

fn pipe_status(e: PipeError) -> ApiError {
    let status = match e {
        PipeError::NotFound(_) => StatusCode::NOT_FOUND,
        PipeError::AlreadyAttached(_) => StatusCode::CONFLICT,
        PipeError::Io(_) | PipeError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

async fn handle_pipe_ws(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let (pipe, end) = state.pipes.attach(&id).await.map_err(pipe_status)?;
    Ok(ws.on_upgrade(move |socket| async move {
        let (sink, stream) = socket.split();
        let sink = sink.with(|bytes: Vec<u8>| future::ready(Ok::<_, axum::Error>(Message::Binary(bytes.into()))));
        let incoming = stream
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Binary(bytes)) => Some(Ok(bytes.to_vec())),
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().as_bytes().to_vec())),
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                })
            });
        if let Err(e) = pipe.copy_to_websocket(end, sink, incoming).await {
            log::info!("pipe {id}: {e}");
        }
        state.pipes.close(&id).await;
    }))
}

async fn handle_pipe_delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> StatusCode {
    if state.pipes.close(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_report_bytes;
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/report", get(handle_report_get).post(handle_report_post))
        .route("/api/topology", get(handle_topologies))
        .route("/api/topology/{view}", get(handle_topology))
        .route("/api/topology/{view}/ws", get(handle_topology_ws))
        .route("/api/topology/{view}/{id}", get(handle_node))
        .route("/api/control/ws", get(handle_probe_ws))
        .route("/api/control/{probe}/{node}/{control}", post(handle_control))
        .route("/api/pipe/{id}", get(handle_pipe_ws).delete(handle_pipe_delete))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Close unattached pipes past their attach timeout until shutdown.
async fn expire_pipes(state: Arc<AppState>) {
    let timeout = state.config.pipe_attach_timeout;
    let mut ticker = tokio::time::interval((timeout / 2).max(Duration::from_millis(100)));
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => return,
            _ = ticker.tick() => {
                state.pipes.expire_unattached(timeout).await;
            }
        }
    }
}

/// Run the HTTP server until Ctrl-C or until `state.shutdown` is cancelled.
pub async fn run_server(state: Arc<AppState>) -> Result<(), ServerError> {
    let addr = state.config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
    log::info!("meshscope listening on http://{addr}");

    tokio::spawn(expire_pipes(Arc::clone(&state)));

    let shutdown = state.shutdown.clone();
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => log::info!("interrupted, shutting down"),
                _ = shutdown.cancelled() => {}
            }
            shutdown.cancel();
        })
        .await?;
    Ok(())
}
