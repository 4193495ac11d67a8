//! Route table and handlers.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{rejection::ExtensionRejection, ConnectInfo, Path, State},
    routing::{any, get},
    Json, Router,
};
use tracing::{debug, warn};
use vakthund_core::{Admission, Gate, GateError, GateState};
use vakthund_telemetry::MetricsRecorder;

use crate::error::ApiError;

/// Body of the favicon and probe responses.
pub const GREETING: &str = "Hello, World!";

type PeerInfo = Result<ConnectInfo<SocketAddr>, ExtensionRejection>;

/// Gate router. Must be served with connect info, e.g. through
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(gate: Arc<Gate>) -> Router {
    Router::new()
        .route("/configs", get(configs))
        .route("/favicon.ico", get(favicon))
        .route("/{port}/{path}", any(admit))
        .fallback(probe)
        .with_state(gate)
}

pub fn metrics_router(metrics: MetricsRecorder) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

/// IPv4-mapped IPv6 peers are reported as plain IPv4.
fn peer_addr(peer: PeerInfo) -> Result<IpAddr, ApiError> {
    let ConnectInfo(addr) = peer?;
    Ok(addr.ip().to_canonical())
}

async fn admit(
    State(gate): State<Arc<Gate>>,
    Path((port, path)): Path<(String, String)>,
    peer: PeerInfo,
) -> Result<String, ApiError> {
    let source = peer_addr(peer)?;
    match gate.admit(&port, &path, source).await {
        Ok(Admission::AlreadyBound) => debug!(%source, "already admitted"),
        Ok(Admission::Bound { .. }) => {}
        Err(GateError::UnknownRoute { .. }) => {
            debug!(%source, port = %port, path = %path, "undeclared route");
            track_probe(&gate, source).await;
            return Ok(GREETING.to_string());
        }
        Err(err) => warn!(%source, error = %err, "admission resync failed"),
    }
    Ok(source.to_string())
}

async fn probe(State(gate): State<Arc<Gate>>, peer: PeerInfo) -> Result<&'static str, ApiError> {
    let source = peer_addr(peer)?;
    track_probe(&gate, source).await;
    Ok(GREETING)
}

async fn track_probe(gate: &Gate, source: IpAddr) {
    if let Err(err) = gate.record_probe(source).await {
        warn!(%source, error = %err, "probe resync failed");
    }
}

async fn favicon() -> &'static str {
    GREETING
}

async fn configs(State(gate): State<Arc<Gate>>) -> Json<GateState> {
    Json(gate.snapshot())
}

async fn render_metrics(State(metrics): State<MetricsRecorder>) -> Result<String, ApiError> {
    metrics
        .gather_metrics()
        .map_err(|err| ApiError::Metrics(err.to_string()))
}
