//! Installing an established session as a connected peer.
//!
//! Shared by the listener and the dialer: resolve the index, split the
//! session, insert the write half into the registry and start the one
//! reader for it. The reader's task owns the cleanup: when it returns, the
//! entry is removed if it still belongs to that connection.

use std::sync::Arc;

use futures::future::BoxFuture;

use peerlink_core::PeerIndex;

use crate::error::NetError;
use crate::reader::InboundReader;
use crate::registry::{PeerHandle, PeerRegistry, RemotePeer};
use crate::resolver::PeerIndexResolver;
use crate::session::Session;

pub(crate) struct Attacher {
    registry: PeerRegistry,
    resolver: Arc<dyn PeerIndexResolver>,
    reader: Arc<dyn InboundReader>,
}

impl Attacher {
    pub fn new(
        registry: PeerRegistry,
        resolver: Arc<dyn PeerIndexResolver>,
        reader: Arc<dyn InboundReader>,
    ) -> Self {
        Self {
            registry,
            resolver,
            reader,
        }
    }

    pub fn resolver(&self) -> &dyn PeerIndexResolver {
        self.resolver.as_ref()
    }

    /// Register `session` and start its reader. A previous connection under
    /// the same index is replaced and closed.
    pub async fn attach(
        &self,
        session: Session,
        host_hint: Option<&str>,
    ) -> Result<PeerIndex, NetError> {
        let remote_key = session.remote_public_key();
        let remote_addr = session.remote_address();
        let index = self.resolver.resolve(&remote_key, host_hint)?;

        let (reader, writer) = session.into_split();
        let peer = RemotePeer::new(index, remote_key, remote_addr, writer);
        let handle = peer.handle();

        let superseded = {
            let mut peers = self.registry.lock().await;
            let superseded = peers.insert(index, peer);
            // Spawned under the lock so the abort handle is stored before
            // the reader can finish and try to remove its entry.
            let run = self.reader.run(handle, reader);
            let task = tokio::spawn(supervise(self.registry.clone(), handle, run));
            if let Some(peer) = peers.get_mut(&index) {
                peer.set_reader_task(task.abort_handle());
            }
            superseded
        };

        tracing::info!(
            peer = index,
            key = %remote_key,
            addr = %remote_addr,
            connection = handle.connection_id,
            "session established"
        );

        if let Some(old) = superseded {
            tracing::info!(
                peer = index,
                connection = old.connection_id(),
                "superseded session closed"
            );
            old.close().await;
        }
        Ok(index)
    }
}

/// Run a peer's reader to completion, then remove its registry entry.
async fn supervise(
    registry: PeerRegistry,
    handle: PeerHandle,
    run: BoxFuture<'static, Result<(), NetError>>,
) {
    match run.await {
        Ok(()) => tracing::info!(peer = handle.index, "session closed by remote"),
        Err(e) => tracing::warn!(peer = handle.index, error = %e, "session reader failed"),
    }

    if let Some(mut peer) = registry.remove_if(handle.index, handle.connection_id).await {
        peer.forget_reader_task();
        peer.close().await;
        tracing::debug!(peer = handle.index, connection = handle.connection_id, "peer removed");
    }
}
