//! /status, /peers, /daemon/shutdown handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use peerlink_net::{NodeStatus, PeerSnapshot};

use super::{net_error, ApiError, ApiState};

// ── /status ──────────────────────────────────────────────────────────────────

pub async fn handle_status(State(state): State<ApiState>) -> Result<Json<NodeStatus>, ApiError> {
    state.node.status().await.map(Json).map_err(net_error)
}

// ── /peers ───────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerSnapshot>,
}

pub async fn handle_peers(State(state): State<ApiState>) -> Json<PeersResponse> {
    let mut peers = state.node.list_connected_peers().await;
    peers.sort_by_key(|p| p.index);
    Json(PeersResponse { peers })
}

// ── /daemon/shutdown ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> (StatusCode, Json<ShutdownResponse>) {
    tracing::info!("shutdown requested via API");
    state.node.shutdown();
    (
        StatusCode::ACCEPTED,
        Json(ShutdownResponse {
            message: "Shutdown initiated".to_string(),
        }),
    )
}
