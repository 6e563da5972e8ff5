//! peerlink-net: the peer connection and message routing layer.
//!
//! Sessions come in through the [`listener`] or go out through the
//! [`dialer`], get a stable [`PeerIndex`] from a [`PeerIndexResolver`], and
//! land in the [`PeerRegistry`]. Every outbound protocol message funnels
//! through one [`Outbox`] into the single [`Dispatcher`], which writes them in
//! enqueue order. [`PeerNode`] ties the pieces together and is the surface
//! the rest of the node talks to.

mod attach;
pub mod dialer;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod listener;
pub mod node;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod session;

#[cfg(test)]
mod testing;

pub use dispatcher::{DispatchOutcome, Dispatcher, Outbox};
pub use error::NetError;
pub use identity::{IdentityError, IdentityProvider, KeyFileIdentity, SeedIdentity, StaticIdentity};
pub use listener::ListenInfo;
pub use node::{NodeOptions, NodeStatus, PeerNode};
pub use reader::{InboundReader, LoggingReader};
pub use registry::{PeerHandle, PeerRegistry, PeerSnapshot, RemotePeer};
pub use resolver::{PeerBook, PeerIndexResolver, PeerRecord, ResolveError};
pub use session::noise::NoiseTcp;
pub use session::{Acceptor, Session, SessionError, SessionReader, SessionWriter, Transport};

pub use peerlink_core::{MsgType, OutboundEnvelope, PeerIndex};
