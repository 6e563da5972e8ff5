//! Live registry of connected peers.
//!
//! One map behind one async mutex. Every access takes the lock for the
//! shortest possible section, with one deliberate exception: the dispatcher
//! holds it across each write so that outbound messages leave in enqueue
//! order across all peers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::AbortHandle;

use peerlink_core::{PeerIndex, PublicKey};

use crate::session::SessionWriter;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one connection for a peer. A reconnect under the same index
/// gets a new id, which keeps a stale reader from removing its successor.
fn next_connection_id() -> u64 {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity of one installed connection, handed to its inbound reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerHandle {
    pub index: PeerIndex,
    pub remote_key: PublicKey,
    pub remote_addr: SocketAddr,
    pub connection_id: u64,
}

/// A connected peer: its identity plus the exclusively-owned write half of
/// its session.
pub struct RemotePeer {
    handle: PeerHandle,
    established_at: Instant,
    writer: Box<dyn SessionWriter>,
    reader_task: Option<AbortHandle>,
}

impl RemotePeer {
    pub fn new(
        index: PeerIndex,
        remote_key: PublicKey,
        remote_addr: SocketAddr,
        writer: Box<dyn SessionWriter>,
    ) -> Self {
        Self {
            handle: PeerHandle {
                index,
                remote_key,
                remote_addr,
                connection_id: next_connection_id(),
            },
            established_at: Instant::now(),
            writer,
            reader_task: None,
        }
    }

    pub fn handle(&self) -> PeerHandle {
        self.handle
    }

    pub fn index(&self) -> PeerIndex {
        self.handle.index
    }

    pub fn remote_key(&self) -> PublicKey {
        self.handle.remote_key
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.handle.remote_addr
    }

    pub fn connection_id(&self) -> u64 {
        self.handle.connection_id
    }

    pub fn uptime(&self) -> Duration {
        self.established_at.elapsed()
    }

    pub(crate) fn writer(&mut self) -> &mut dyn SessionWriter {
        self.writer.as_mut()
    }

    pub(crate) fn set_reader_task(&mut self, task: AbortHandle) {
        self.reader_task = Some(task);
    }

    /// Called from the reader's own task, which must not abort itself.
    pub(crate) fn forget_reader_task(&mut self) {
        self.reader_task = None;
    }

    /// Tear down the connection: stop its reader and close the write half.
    pub(crate) async fn close(mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(peer = self.handle.index, error = %e, "session shutdown failed");
        }
    }

    fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            index: self.handle.index,
            remote_host: self.handle.remote_addr.to_string(),
        }
    }
}

/// Point-in-time copy of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerSnapshot {
    pub index: PeerIndex,
    pub remote_host: String,
}

/// At most one [`RemotePeer`] per index.
#[derive(Clone, Default)]
pub struct PeerRegistry {
    peers: Arc<Mutex<HashMap<PeerIndex, RemotePeer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, HashMap<PeerIndex, RemotePeer>> {
        self.peers.lock().await
    }

    /// Insert `peer`, returning the entry it replaced. The caller closes the
    /// superseded connection once the lock is released.
    pub async fn install(&self, peer: RemotePeer) -> Option<RemotePeer> {
        self.lock().await.insert(peer.index(), peer)
    }

    pub async fn contains(&self, index: PeerIndex) -> bool {
        self.lock().await.contains_key(&index)
    }

    pub async fn handle(&self, index: PeerIndex) -> Option<PeerHandle> {
        self.lock().await.get(&index).map(RemotePeer::handle)
    }

    pub async fn snapshot(&self) -> Vec<PeerSnapshot> {
        self.lock().await.values().map(RemotePeer::snapshot).collect()
    }

    pub async fn remove(&self, index: PeerIndex) -> Option<RemotePeer> {
        self.lock().await.remove(&index)
    }

    /// Remove `index` only while it still holds connection `connection_id`.
    pub async fn remove_if(&self, index: PeerIndex, connection_id: u64) -> Option<RemotePeer> {
        let mut peers = self.lock().await;
        match peers.get(&index) {
            Some(peer) if peer.connection_id() == connection_id => peers.remove(&index),
            _ => None,
        }
    }

    pub async fn len(&self) -> usize {
        self.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.is_empty()
    }
}
