//! [`PeerNode`]: the peer layer as the rest of the node sees it.
//!
//! Owns the registry, the outbound queue and its dispatcher, and starts the
//! listener and dialer on request. Cheap to clone; every clone talks to the
//! same node.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use peerlink_core::address::{fingerprint, NodeAddress};
use peerlink_core::{Keypair, OutboundEnvelope, PeerAddr, PeerIndex, PublicKey};

use crate::attach::Attacher;
use crate::dialer::Dialer;
use crate::dispatcher::{Dispatcher, Outbox};
use crate::error::NetError;
use crate::identity::IdentityProvider;
use crate::listener::{ListenInfo, SessionListener};
use crate::reader::InboundReader;
use crate::registry::{PeerRegistry, PeerSnapshot};
use crate::resolver::PeerIndexResolver;
use crate::session::Transport;

#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    /// Upper bound on one outbound write. None waits indefinitely.
    pub write_timeout: Option<Duration>,
}

/// Summary of the node for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub public_key: String,
    pub address: String,
    pub fingerprint: String,
    pub listen_addr: Option<String>,
    pub peers: usize,
}

#[derive(Clone)]
pub struct PeerNode {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    transport: Arc<dyn Transport>,
    registry: PeerRegistry,
    attacher: Arc<Attacher>,
    dialer: Dialer,
    outbox: Outbox,
    shutdown: broadcast::Sender<()>,
    listen_info: Mutex<Option<ListenInfo>>,
}

impl PeerNode {
    /// Build a node and start its dispatcher. Must run inside a tokio runtime.
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn PeerIndexResolver>,
        reader: Arc<dyn InboundReader>,
        options: NodeOptions,
    ) -> Self {
        let registry = PeerRegistry::new();
        let (shutdown, _) = broadcast::channel(1);
        let (outbox, queue) = Outbox::channel();

        let dispatcher = Dispatcher::new(
            registry.clone(),
            queue,
            options.write_timeout,
            shutdown.subscribe(),
        );
        tokio::spawn(dispatcher.run());

        let attacher = Arc::new(Attacher::new(registry.clone(), resolver, reader));
        let dialer = Dialer::new(transport.clone(), identity.clone(), attacher.clone());

        Self {
            inner: Arc::new(Inner {
                identity,
                transport,
                registry,
                attacher,
                dialer,
                outbox,
                shutdown,
                listen_info: Mutex::new(None),
            }),
        }
    }

    // ── Sessions ─────────────────────────────────────────────────────────────

    /// Bind `addr` and accept inbound sessions in the background until
    /// shutdown. Identity and bind failures are returned.
    pub async fn start_listening(&self, addr: &str) -> Result<ListenInfo, NetError> {
        let keypair = self.identity_key()?;
        let acceptor = self.inner.transport.listen(keypair.clone(), addr).await?;
        let info = ListenInfo::new(acceptor.local_addr(), keypair.public);

        tracing::info!(
            addr = %info.bound,
            address = %info.address,
            fingerprint = %info.fingerprint,
            "listening for peers"
        );

        let listener = SessionListener::new(
            acceptor,
            keypair.public,
            self.inner.attacher.clone(),
            self.inner.shutdown.subscribe(),
        );
        tokio::spawn(listener.run());

        *self.lock_listen_info() = Some(info.clone());
        Ok(info)
    }

    /// Dial `target` and install the session. Returns the peer's index.
    pub async fn connect_to_peer(&self, target: &PeerAddr) -> Result<PeerIndex, NetError> {
        self.inner.dialer.connect(target).await
    }

    /// Redial a known peer at its last dialed host.
    pub async fn reconnect(&self, index: PeerIndex) -> Result<PeerIndex, NetError> {
        self.inner.dialer.reconnect(index).await
    }

    /// Drop the peer's session. Returns false if it was not connected.
    pub async fn disconnect(&self, index: PeerIndex) -> bool {
        match self.inner.registry.remove(index).await {
            Some(peer) => {
                peer.close().await;
                tracing::info!(peer = index, "peer disconnected");
                true
            }
            None => false,
        }
    }

    // ── Messaging ────────────────────────────────────────────────────────────

    /// Queue an envelope for the dispatcher.
    pub fn send(&self, envelope: OutboundEnvelope) -> Result<(), NetError> {
        self.inner.outbox.send(envelope)
    }

    pub fn outbox(&self) -> Outbox {
        self.inner.outbox.clone()
    }

    /// Queue a text chat message. Fails up front if the peer is not
    /// connected; otherwise delivery is fire-and-forget.
    pub async fn send_text(&self, index: PeerIndex, text: &str) -> Result<(), NetError> {
        if !self.is_connected(index).await {
            return Err(NetError::NotConnected(index));
        }
        self.send(OutboundEnvelope::text(index, text))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn list_connected_peers(&self) -> Vec<PeerSnapshot> {
        self.inner.registry.snapshot().await
    }

    pub async fn is_connected(&self, index: PeerIndex) -> bool {
        self.inner.registry.contains(index).await
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.inner.registry
    }

    pub fn identity_key(&self) -> Result<Arc<Keypair>, NetError> {
        Ok(self.inner.identity.identity_key()?)
    }

    pub fn local_key(&self) -> Result<PublicKey, NetError> {
        Ok(self.identity_key()?.public)
    }

    pub fn node_address(&self) -> Result<NodeAddress, NetError> {
        Ok(NodeAddress::from_public_key(&self.local_key()?))
    }

    /// Most recent listener binding, if listening.
    pub fn listen_info(&self) -> Option<ListenInfo> {
        self.lock_listen_info().clone()
    }

    pub async fn status(&self) -> Result<NodeStatus, NetError> {
        let key = self.local_key()?;
        Ok(NodeStatus {
            public_key: key.to_string(),
            address: NodeAddress::from_public_key(&key).to_string(),
            fingerprint: fingerprint(&key),
            listen_addr: self.listen_info().map(|i| i.bound.to_string()),
            peers: self.inner.registry.len().await,
        })
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Stop the listener and dispatcher. Connected sessions stay up until
    /// the node is dropped.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(());
    }

    /// Receiver that fires when [`PeerNode::shutdown`] is called.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.inner.shutdown.subscribe()
    }

    fn lock_listen_info(&self) -> std::sync::MutexGuard<'_, Option<ListenInfo>> {
        self.inner
            .listen_info
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}
