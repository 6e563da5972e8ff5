//! Inbound side: one read loop per connected peer.
//!
//! What a message means once it arrives is up to the [`InboundReader`]. The
//! core only guarantees that exactly one reader runs per installed
//! connection, started after the registry insert, and that the entry is
//! removed when the reader returns.

use futures::future::BoxFuture;

use peerlink_core::wire::split_frame;
use peerlink_core::MsgType;

use crate::error::NetError;
use crate::registry::PeerHandle;
use crate::session::SessionReader;

pub trait InboundReader: Send + Sync + 'static {
    /// Drive `reader` until the session ends. Returning, for any reason,
    /// ends the connection.
    fn run(
        &self,
        peer: PeerHandle,
        reader: Box<dyn SessionReader>,
    ) -> BoxFuture<'static, Result<(), NetError>>;
}

/// Logs every inbound message and prints text chat.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReader;

impl InboundReader for LoggingReader {
    fn run(
        &self,
        peer: PeerHandle,
        mut reader: Box<dyn SessionReader>,
    ) -> BoxFuture<'static, Result<(), NetError>> {
        Box::pin(async move {
            while let Some(frame) = reader.read().await? {
                let Some((msg_type, payload)) = split_frame(&frame) else {
                    tracing::debug!(peer = peer.index, "empty message ignored");
                    continue;
                };
                tracing::debug!(
                    peer = peer.index,
                    msg_type = ?msg_type,
                    bytes = payload.len(),
                    "message received"
                );
                if msg_type == MsgType::TEXT_CHAT {
                    let text = String::from_utf8_lossy(&payload);
                    tracing::info!(peer = peer.index, text = %text, "text message");
                    println!("[peer {}] {}", peer.index, text);
                }
            }
            Ok(())
        })
    }
}
