//! Errors surfaced to callers of the peer layer.
//!
//! Only single-shot operations (listen, dial, send pre-checks) return these.
//! Failures inside the long-running loops are logged and contained there.

use thiserror::Error;

use peerlink_core::PeerIndex;

use crate::identity::IdentityError;
use crate::resolver::ResolveError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("identity key unavailable: {0}")]
    Identity(#[from] IdentityError),

    #[error("peer index resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("not connected to peer {0}")]
    NotConnected(PeerIndex),

    #[error("outbound queue is closed")]
    OutboxClosed,

    #[error("peer {0} is not in the peer book")]
    UnknownPeer(PeerIndex),

    #[error("no known host for peer {0}")]
    NoKnownHost(PeerIndex),

    #[error("remote presented our own identity key")]
    SelfConnection,
}
