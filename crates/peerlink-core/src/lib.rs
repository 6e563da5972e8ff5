//! peerlink-core: shared types, addressing, configuration, and cryptographic
//! primitives. All other peerlink crates depend on this one.

pub mod address;
pub mod config;
pub mod crypto;
pub mod wire;

pub use address::{ExpectedIdentity, NodeAddress, PeerAddr};
pub use crypto::{Keypair, PublicKey};
pub use wire::{MsgType, OutboundEnvelope, PeerIndex};
