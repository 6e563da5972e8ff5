//! /connect, /reconnect, /peers/{index} handlers for session management.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use peerlink_core::{PeerAddr, PeerIndex};

use super::{net_error, ApiError, ApiState};

#[derive(Serialize)]
pub struct IndexResponse {
    pub index: PeerIndex,
}

// ── /connect (POST) ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ConnectRequest {
    /// `<identity>@<host>[:port]`
    pub target: String,
}

pub async fn handle_connect(
    State(state): State<ApiState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let target: PeerAddr = req
        .target
        .parse()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid target: {e}")))?;
    let index = state.node.connect_to_peer(&target).await.map_err(net_error)?;
    tracing::info!(peer = index, target = %target, "peer connected via API");
    Ok(Json(IndexResponse { index }))
}

// ── /reconnect (POST) ────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ReconnectRequest {
    pub index: PeerIndex,
}

pub async fn handle_reconnect(
    State(state): State<ApiState>,
    Json(req): Json<ReconnectRequest>,
) -> Result<Json<IndexResponse>, ApiError> {
    let index = state.node.reconnect(req.index).await.map_err(net_error)?;
    Ok(Json(IndexResponse { index }))
}

// ── /peers/{index} (DELETE) ──────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeerDropResponse {
    pub index: PeerIndex,
    pub dropped: bool,
}

pub async fn handle_peer_drop(
    State(state): State<ApiState>,
    Path(index): Path<PeerIndex>,
) -> Json<PeerDropResponse> {
    let dropped = state.node.disconnect(index).await;
    if dropped {
        tracing::info!(peer = index, "peer dropped via API");
    }
    Json(PeerDropResponse { index, dropped })
}
