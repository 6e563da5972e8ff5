//! HTTP API handlers. Exposes the peer layer as JSON.

pub mod messages;
pub mod peers;
pub mod status;

use axum::http::StatusCode;

use peerlink_net::{NetError, PeerNode};

#[derive(Clone)]
pub struct ApiState {
    pub node: PeerNode,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

pub type ApiError = (StatusCode, String);

/// Map a peer-layer failure onto an HTTP status.
fn net_error(e: NetError) -> ApiError {
    let status = match &e {
        NetError::NotConnected(_) | NetError::NoKnownHost(_) => StatusCode::CONFLICT,
        NetError::UnknownPeer(_) => StatusCode::NOT_FOUND,
        NetError::SelfConnection => StatusCode::BAD_REQUEST,
        NetError::Session(_) => StatusCode::BAD_GATEWAY,
        NetError::OutboxClosed => StatusCode::SERVICE_UNAVAILABLE,
        NetError::Identity(_) | NetError::Resolve(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use messages::handle_say;
pub use peers::{handle_connect, handle_peer_drop, handle_reconnect};
pub use status::{handle_peers, handle_shutdown, handle_status};
