//! control.rs — HTTP/WebSocket control plane
//!
//!   POST /api/start    start a fresh simulator (optional JSON config body)
//!   POST /api/stop     stop and discard the current simulator
//!   GET  /api/status   status of the current simulator
//!   POST /api/config   store a config; hot-swap it into a running simulator
//!   GET  /api/ws       status on connect, then every tick as
//!                      {"type":"nmea_data","data":…}
//!   GET  /health
//!
//! JSON config bodies use the same field names as the TOML config file and
//! every field is optional.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SimError;
use crate::simulator::Simulator;
use crate::sink::SentenceSink;

/// Builds the output sink for each simulator the control plane starts.
pub type SinkFactory = Arc<dyn Fn(&Config) -> Result<SentenceSink, SimError> + Send + Sync>;

#[derive(Clone)]
pub struct ControlState {
    inner: Arc<RwLock<ControlInner>>,
    feed: broadcast::Sender<String>,
    make_sink: SinkFactory,
}

struct ControlInner {
    simulator: Option<Simulator>,
    /// Used by `/api/start` when no body is sent
    last_config: Config,
}

impl ControlState {
    pub fn new(initial: Config, make_sink: SinkFactory) -> Self {
        let (feed, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RwLock::new(ControlInner { simulator: None, last_config: initial })),
            feed,
            make_sink,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

pub enum ApiError {
    Simulator(SimError),
    BadJson(serde_json::Error),
}

impl From<SimError> for ApiError {
    fn from(e: SimError) -> Self {
        ApiError::Simulator(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            ApiError::Simulator(e) => e.to_string(),
            ApiError::BadJson(e) => format!("invalid JSON: {e}"),
        };
        warn!("API error: {message}");
        (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
    }
}

fn parse_config(body: &[u8]) -> Result<Option<Config>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(ApiError::BadJson)
}

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router(state: ControlState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/start", post(start))
        .route("/api/stop", post(stop))
        .route("/api/status", get(status))
        .route("/api/config", post(update_config))
        .route("/api/ws", get(ws_handler))
        .route("/health", get(|| async { "gps-sim ok" }))
        .with_state(state)
        .layer(cors)
}

pub async fn serve(addr: SocketAddr, state: ControlState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Control plane at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn start(State(ctl): State<ControlState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let mut inner = ctl.inner.write().await;
    let config = parse_config(&body)?.unwrap_or_else(|| inner.last_config.clone());
    config.validate().map_err(SimError::from)?;
    inner.last_config = config.clone();

    if let Some(old) = inner.simulator.take() {
        if old.is_running().await {
            info!("Stopping existing simulator before starting a new one");
            let _ = old.stop().await;
        }
    }

    let sim = Simulator::new(config.clone(), (ctl.make_sink)(&config)?)?;
    let feed = ctl.feed.clone();
    sim.add_observer(move |data| {
        let message = json!({ "type": "nmea_data", "data": data });
        // no receivers is fine
        let _ = feed.send(message.to_string());
    })
    .await;
    sim.start().await?;
    inner.simulator = Some(sim);

    info!("Simulator started via control plane");
    Ok(Json(json!({ "status": "started" })))
}

async fn stop(State(ctl): State<ControlState>) -> Result<Json<Value>, ApiError> {
    let mut inner = ctl.inner.write().await;
    match inner.simulator.take() {
        Some(sim) => {
            if sim.is_running().await {
                sim.stop().await?;
                info!("Simulator stopped via control plane");
            } else {
                debug!("Simulator already stopped; cleared");
            }
        }
        None => debug!("Stop requested with no simulator"),
    }
    Ok(Json(json!({ "status": "stopped" })))
}

async fn status(State(ctl): State<ControlState>) -> Json<Value> {
    let inner = ctl.inner.read().await;
    match &inner.simulator {
        Some(sim) => Json(json!(sim.status().await)),
        None => Json(json!({ "running": false, "message": "No simulator instance" })),
    }
}

async fn update_config(State(ctl): State<ControlState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let mut inner = ctl.inner.write().await;
    let config = parse_config(&body)?.unwrap_or_default();
    config.validate().map_err(SimError::from)?;
    inner.last_config = config.clone();

    let live = match &inner.simulator {
        Some(sim) => sim.is_running().await.then_some(sim),
        None => None,
    };
    match live {
        Some(sim) => {
            sim.update_config(config).await?;
            info!("Configuration hot-swapped into running simulator");
        }
        None => info!("Configuration stored for next start"),
    }
    Ok(Json(json!({ "status": "updated" })))
}

// ── WebSocket feed ────────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(ctl): State<ControlState>) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, ctl))
}

async fn handle_ws(mut socket: WebSocket, ctl: ControlState) {
    let mut feed = ctl.feed.subscribe();
    info!("WebSocket client connected");

    let current = {
        let inner = ctl.inner.read().await;
        match &inner.simulator {
            Some(sim) => Some(sim.status().await),
            None => None,
        }
    };
    if let Some(status) = current {
        let hello = json!({ "type": "status", "data": status }).to_string();
        if socket.send(Message::Text(hello)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            msg = feed.recv() => match msg {
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("WebSocket client lagged, skipped {n} ticks");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(Message::Text(text))) => debug!("WebSocket message ignored: {text}"),
                Some(Ok(_)) => {}
            },
        }
    }
    info!("WebSocket client disconnected");
}
