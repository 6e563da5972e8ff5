//! Node addressing.
//!
//! A node is identified on the network by its static public key. For display
//! and discovery the key is condensed into a 20-byte key hash and encoded as a
//! base58 [`NodeAddress`] with a version byte and a 4-byte checksum:
//!
//!   base58( version(1) || BLAKE3(pubkey)[..20] || BLAKE3(version || hash)[..4] )
//!
//! Dial targets ([`PeerAddr`]) pair an expected identity (either the full key
//! or a node address) with a network location: `<identity>@<host>[:port]`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::crypto::{hash, PublicKey};

/// Version byte of the node address encoding.
pub const ADDRESS_VERSION: u8 = 0x6c;

/// Port assumed when a dial target omits one.
pub const DEFAULT_PORT: u16 = 2448;

const KEY_HASH_LEN: usize = 20;
const CHECKSUM_LEN: usize = 4;
const ADDRESS_LEN: usize = 1 + KEY_HASH_LEN + CHECKSUM_LEN;

/// 20-byte hash of a public key.
pub type KeyHash = [u8; KEY_HASH_LEN];

/// Hash a public key down to the 20 bytes carried in a node address.
pub fn key_hash(key: &PublicKey) -> KeyHash {
    let digest = hash(key.as_bytes());
    let mut out = [0u8; KEY_HASH_LEN];
    out.copy_from_slice(&digest[..KEY_HASH_LEN]);
    out
}

/// Short display fingerprint: hex of the first 16 bytes of the key hash.
pub fn fingerprint(key: &PublicKey) -> String {
    hex::encode(&key_hash(key)[..16])
}

fn checksum(version: u8, key_hash: &KeyHash) -> [u8; CHECKSUM_LEN] {
    let mut h = blake3::Hasher::new();
    h.update(&[version]);
    h.update(key_hash);
    let digest = h.finalize();
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest.as_bytes()[..CHECKSUM_LEN]);
    out
}

// ── NodeAddress ───────────────────────────────────────────────────────────────

/// Presentable, checksummed address derived from a node's public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    key_hash: KeyHash,
}

impl NodeAddress {
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self {
            key_hash: key_hash(key),
        }
    }

    pub fn key_hash(&self) -> &KeyHash {
        &self.key_hash
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw = Vec::with_capacity(ADDRESS_LEN);
        raw.push(ADDRESS_VERSION);
        raw.extend_from_slice(&self.key_hash);
        raw.extend_from_slice(&checksum(ADDRESS_VERSION, &self.key_hash));
        f.write_str(&bs58::encode(raw).into_string())
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddress({self})")
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = bs58::decode(s)
            .into_vec()
            .map_err(|_| AddressError::NotBase58)?;
        if raw.len() != ADDRESS_LEN {
            return Err(AddressError::BadLength(raw.len()));
        }
        if raw[0] != ADDRESS_VERSION {
            return Err(AddressError::BadVersion(raw[0]));
        }
        let mut key_hash = [0u8; KEY_HASH_LEN];
        key_hash.copy_from_slice(&raw[1..1 + KEY_HASH_LEN]);
        if raw[1 + KEY_HASH_LEN..] != checksum(raw[0], &key_hash) {
            return Err(AddressError::BadChecksum);
        }
        Ok(Self { key_hash })
    }
}

// ── ExpectedIdentity ──────────────────────────────────────────────────────────

/// Who we expect to find on the other end of a dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedIdentity {
    /// The full static public key is known.
    Key(PublicKey),
    /// Only a node address is known; the key must hash to it.
    KeyHash(KeyHash),
}

impl ExpectedIdentity {
    pub fn matches(&self, key: &PublicKey) -> bool {
        match self {
            Self::Key(expected) => expected == key,
            Self::KeyHash(expected) => *expected == key_hash(key),
        }
    }
}

impl fmt::Display for ExpectedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::KeyHash(hash) => write!(f, "{}", NodeAddress { key_hash: *hash }),
        }
    }
}

impl FromStr for ExpectedIdentity {
    type Err = AddressError;

    /// 64 hex characters parse as a full key, anything else as a node address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit()) {
            let key = s.parse().map_err(|_| AddressError::NotHex)?;
            return Ok(Self::Key(key));
        }
        let addr: NodeAddress = s.parse()?;
        Ok(Self::KeyHash(addr.key_hash))
    }
}

// ── PeerAddr ──────────────────────────────────────────────────────────────────

/// A dial target: expected identity plus network location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    pub identity: ExpectedIdentity,
    /// `host:port`, with the default port filled in when omitted.
    pub net_addr: String,
}

impl PeerAddr {
    pub fn new(identity: ExpectedIdentity, net_addr: impl Into<String>) -> Self {
        Self {
            identity,
            net_addr: net_addr.into(),
        }
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.net_addr)
    }
}

impl FromStr for PeerAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (identity, host) = s.split_once('@').ok_or(AddressError::MissingHost)?;
        if host.is_empty() {
            return Err(AddressError::MissingHost);
        }
        let identity = identity.parse()?;
        Ok(Self {
            identity,
            net_addr: with_default_port(host),
        })
    }
}

/// Append the default port unless the host already carries one.
/// Bracketed IPv6 literals (`[::1]`) count as hosts without a port.
fn with_default_port(host: &str) -> String {
    let has_port = match host.rfind(']') {
        Some(end) => host[end..].contains(':'),
        None => host.matches(':').count() == 1,
    };
    if has_port {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not valid base58")]
    NotBase58,
    #[error("public key is not valid hex")]
    NotHex,
    #[error("address decodes to {0} bytes, expected {ADDRESS_LEN}")]
    BadLength(usize),
    #[error("unknown address version {0:#04x}")]
    BadVersion(u8),
    #[error("address checksum mismatch")]
    BadChecksum,
    #[error("peer address must look like <identity>@<host>[:port]")]
    MissingHost,
}
