//! Inbound session listener.
//!
//! Accepts sessions from the bound [`Acceptor`] and installs each one as a
//! peer. Inbound sessions carry no host hint: the address a remote connects
//! from says nothing about where it can be dialed.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

use peerlink_core::address::{fingerprint, NodeAddress};
use peerlink_core::PublicKey;

use crate::attach::Attacher;
use crate::session::{Acceptor, Session, SessionError};

/// Where and as whom the node is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenInfo {
    pub bound: SocketAddr,
    pub address: NodeAddress,
    /// Hex of the first 16 bytes of the key hash.
    pub fingerprint: String,
    pub public_key: PublicKey,
}

impl ListenInfo {
    pub fn new(bound: SocketAddr, public_key: PublicKey) -> Self {
        Self {
            bound,
            address: NodeAddress::from_public_key(&public_key),
            fingerprint: fingerprint(&public_key),
            public_key,
        }
    }
}

pub(crate) struct SessionListener {
    acceptor: Box<dyn Acceptor>,
    local_key: PublicKey,
    attacher: Arc<Attacher>,
    shutdown: broadcast::Receiver<()>,
}

impl SessionListener {
    pub fn new(
        acceptor: Box<dyn Acceptor>,
        local_key: PublicKey,
        attacher: Arc<Attacher>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            acceptor,
            local_key,
            attacher,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("session listener shutting down");
                    return;
                }

                result = self.acceptor.accept() => match result {
                    Ok(session) => self.on_session(session).await,
                    Err(SessionError::Closed) => {
                        tracing::warn!("acceptor closed, session listener exiting");
                        return;
                    }
                    Err(e) => tracing::warn!(error = %e, "inbound session rejected"),
                },
            }
        }
    }

    async fn on_session(&self, session: Session) {
        let remote_addr = session.remote_address();
        if session.remote_public_key() == self.local_key {
            tracing::warn!(addr = %remote_addr, "rejected session from our own key");
            return;
        }
        if let Err(e) = self.attacher.attach(session, None).await {
            tracing::warn!(addr = %remote_addr, error = %e, "failed to install inbound session");
        }
    }
}
