//! /say handler: text chat to a connected peer.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use peerlink_core::PeerIndex;

use super::{net_error, ApiError, ApiState};

#[derive(Deserialize)]
pub struct SayRequest {
    pub index: PeerIndex,
    pub text: String,
}

#[derive(Serialize)]
pub struct SayResponse {
    pub queued: bool,
}

pub async fn handle_say(
    State(state): State<ApiState>,
    Json(req): Json<SayRequest>,
) -> Result<Json<SayResponse>, ApiError> {
    state
        .node
        .send_text(req.index, &req.text)
        .await
        .map_err(net_error)?;
    Ok(Json(SayResponse { queued: true }))
}
