//! Outbound dispatcher: the single writer for every peer.
//!
//! All outbound protocol messages from anywhere in the node are queued on one
//! channel and written by one task, in the order they were queued. The
//! registry lock is held across each write, which is what makes the order
//! global rather than per peer: nothing else can touch a session's write half
//! while a message is going out. A slow peer therefore delays everyone; the
//! optional write timeout bounds how long.
//!
//! A peer whose write fails is removed from the registry on the spot and its
//! session closed, reader included. It never lingers as connected waiting
//! for the remote to notice.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use peerlink_core::{OutboundEnvelope, PeerIndex};

use crate::error::NetError;
use crate::registry::PeerRegistry;
use crate::session::SessionError;

/// Cloneable sending side of the outbound queue.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundEnvelope>,
}

impl Outbox {
    /// Create a queue, returning the handle and the receiver for a [`Dispatcher`].
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue `envelope`. Never blocks; fails only once the dispatcher is gone.
    pub fn send(&self, envelope: OutboundEnvelope) -> Result<(), NetError> {
        self.tx.send(envelope).map_err(|_| NetError::OutboxClosed)
    }
}

/// What happened to one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Written to the peer's session; carries the framed length.
    Delivered(usize),
    /// No peer with that index; the envelope was dropped.
    NotConnected,
    /// The write failed or timed out; the peer was removed and its session
    /// closed.
    WriteFailed,
}

pub struct Dispatcher {
    registry: PeerRegistry,
    queue: mpsc::UnboundedReceiver<OutboundEnvelope>,
    write_timeout: Option<Duration>,
    shutdown: broadcast::Receiver<()>,
}

impl Dispatcher {
    pub fn new(
        registry: PeerRegistry,
        queue: mpsc::UnboundedReceiver<OutboundEnvelope>,
        write_timeout: Option<Duration>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            registry,
            queue,
            write_timeout,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("dispatcher shutting down");
                    return;
                }

                envelope = self.queue.recv() => {
                    let Some(envelope) = envelope else {
                        tracing::info!("outbox dropped, dispatcher exiting");
                        return;
                    };
                    self.dispatch(envelope).await;
                }
            }
        }
    }

    /// Write one envelope to its peer.
    pub async fn dispatch(&self, envelope: OutboundEnvelope) -> DispatchOutcome {
        let frame = envelope.frame();
        let index: PeerIndex = envelope.peer;
        let msg_type = envelope.msg_type;

        let mut peers = self.registry.lock().await;
        let Some(peer) = peers.get_mut(&index) else {
            tracing::warn!(peer = index, msg_type = ?msg_type, "peer not connected, message dropped");
            return DispatchOutcome::NotConnected;
        };

        let write = peer.writer().write(&frame);
        let result = match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or(Err(SessionError::WriteTimeout)),
            None => write.await,
        };

        match result {
            Ok(_) => {
                tracing::debug!(peer = index, msg_type = ?msg_type, bytes = frame.len(), "message sent");
                DispatchOutcome::Delivered(frame.len())
            }
            Err(e) => {
                tracing::warn!(peer = index, msg_type = ?msg_type, error = %e, "write failed, dropping peer");
                let failed = peers.remove(&index);
                drop(peers);
                if let Some(peer) = failed {
                    peer.close().await;
                }
                DispatchOutcome::WriteFailed
            }
        }
    }
}
