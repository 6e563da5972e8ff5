//! Outbound session initiator.
//!
//! Dials a [`PeerAddr`], insists the remote is who the address says, and
//! installs the session the same way the listener does. The dialed
//! `host:port` goes to the resolver as a hint so the peer can be redialed
//! by index later.

use std::sync::Arc;

use peerlink_core::{ExpectedIdentity, PeerAddr, PeerIndex};

use crate::attach::Attacher;
use crate::error::NetError;
use crate::identity::IdentityProvider;
use crate::session::Transport;

pub(crate) struct Dialer {
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    attacher: Arc<Attacher>,
}

impl Dialer {
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
        attacher: Arc<Attacher>,
    ) -> Self {
        Self {
            transport,
            identity,
            attacher,
        }
    }

    /// Handshake with `target` and install it. Returns once the peer is in
    /// the registry; its reader runs in the background.
    pub async fn connect(&self, target: &PeerAddr) -> Result<PeerIndex, NetError> {
        let keypair = self.identity.identity_key()?;
        if target.identity.matches(&keypair.public) {
            return Err(NetError::SelfConnection);
        }

        tracing::debug!(target = %target, "dialing peer");
        let session = self
            .transport
            .dial(keypair.clone(), &target.net_addr, Some(target.identity))
            .await?;
        if session.remote_public_key() == keypair.public {
            return Err(NetError::SelfConnection);
        }

        self.attacher.attach(session, Some(&target.net_addr)).await
    }

    /// Redial a peer the resolver already knows, at its last dialed host.
    pub async fn reconnect(&self, index: PeerIndex) -> Result<PeerIndex, NetError> {
        let record = self
            .attacher
            .resolver()
            .lookup(index)
            .ok_or(NetError::UnknownPeer(index))?;
        let host = record.host.ok_or(NetError::NoKnownHost(index))?;
        self.connect(&PeerAddr::new(ExpectedIdentity::Key(record.key), host))
            .await
    }
}
