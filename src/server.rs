//! Read-only HTTP view of a running engine.
//!
//! The server never touches engine state directly. It serves whatever the
//! engine last published into its [`SnapshotHandle`].
//!
//! # Endpoints
//!
//! ```text
//! GET /health    liveness, link state, last reading time
//! GET /snapshot  the full current EngineSnapshot
//! GET /history   telemetry points, archived records and a summary
//! ```

use crate::core::engine::{EngineSnapshot, SnapshotHandle};
use crate::core::history::{summarize, HistoryPoint, HistoryRecord, HistorySummary};
use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Records included in the history summary when no limit is given.
const DEFAULT_SUMMARY_WINDOW: usize = 7;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    snapshots: SnapshotHandle,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reading_ms: Option<u64>,
}

/// Query parameters for GET /history
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Only return the newest `limit` records
    pub limit: Option<usize>,
}

/// History response
#[derive(Serialize)]
pub struct HistoryResponse {
    pub telemetry: Vec<HistoryPoint>,
    pub records: Vec<HistoryRecord>,
    pub summary: HistorySummary,
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let snapshot = state.snapshots.load();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected: snapshot.connected,
        last_reading_ms: snapshot.reading.map(|r| r.timestamp_ms),
    })
}

/// GET /snapshot
async fn snapshot(State(state): State<Arc<ServerState>>) -> Json<EngineSnapshot> {
    Json(state.snapshots.load().as_ref().clone())
}

/// GET /history
async fn history(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let snapshot = state.snapshots.load();
    let limit = query.limit.unwrap_or(snapshot.records.len());
    let records: Vec<HistoryRecord> = snapshot.records.iter().take(limit).cloned().collect();
    let window = query.limit.unwrap_or(DEFAULT_SUMMARY_WINDOW);

    Json(HistoryResponse {
        telemetry: snapshot.telemetry.clone(),
        summary: summarize(snapshot.records.iter().take(window)),
        records,
    })
}

/// Build the router. Exposed separately so it can be mounted elsewhere.
pub fn router(snapshots: SnapshotHandle) -> Router {
    let state = Arc::new(ServerState { snapshots });

    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/history", get(history))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    snapshots: SnapshotHandle,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(snapshots);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Snapshot server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
