//! Cryptographic primitives for peerlink.
//!
//! Provides two things:
//!   1. BLAKE3 hashing: key hashes for node addresses, identity derivation
//!   2. Noise_XX session establishment: authenticated key exchange over a
//!      reliable, ordered byte stream
//!
//! Keypairs are managed via x25519-dalek for explicit key control.
//! snow drives the Noise_XX state machine using those keys.
//!
//! This module performs no I/O. The transport layer moves the handshake
//! messages produced here across the network.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snow::{Builder, HandshakeState, StatelessTransportState};
use thiserror::Error;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::address::ExpectedIdentity;

// ── BLAKE3 ────────────────────────────────────────────────────────────────────

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

// ── Public key ────────────────────────────────────────────────────────────────

/// A node's static X25519 public key, its long-term network identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a remote static key slice as reported by the Noise state.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &hex::encode(self.0)[..16])
    }
}

impl FromStr for PublicKey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Keypair ───────────────────────────────────────────────────────────────────

/// The Noise protocol pattern peerlink uses.
///
/// Noise_XX: mutual authentication, both static keys transmitted encrypted.
/// The dialer learns the listener's static key in message 2 and can reject
/// it before revealing its own in message 3.
const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

/// Bound into every handshake transcript. A peer speaking a different
/// protocol revision fails the handshake instead of misparsing traffic.
const PROLOGUE: &[u8] = b"peerlink/1";

/// Largest Noise message (handshake or transport), set by the 16-bit length
/// prefix on the wire.
pub const MAX_NOISE_MESSAGE_LEN: usize = 65535;

/// Poly1305 tag appended to every transport message.
pub const TAG_LEN: usize = 16;

/// Largest plaintext a single transport message can carry.
pub const MAX_PLAINTEXT_LEN: usize = MAX_NOISE_MESSAGE_LEN - TAG_LEN;

/// Scratch size for handshake messages. XX messages are at most 96 bytes.
const HANDSHAKE_BUF_LEN: usize = 1024;

/// A node's long-term static X25519 keypair.
///
/// The private key never leaves this struct except through
/// [`Keypair::private_bytes`], which hands out a zeroizing copy.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    /// Private key. Zeroized on drop, never exposed directly.
    private: Zeroizing<[u8; 32]>,
    /// Public key: the node's network identity.
    #[zeroize(skip)]
    pub public: PublicKey,
}

impl Keypair {
    /// Generate a new random X25519 keypair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        Self::from_private(secret.to_bytes())
    }

    /// Reconstruct a keypair from stored private key bytes.
    /// The public key is derived deterministically from the private key.
    pub fn from_private(private_bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private_bytes);
        let public = x25519_dalek::PublicKey::from(&secret);
        Self {
            private: Zeroizing::new(private_bytes),
            public: PublicKey(*public.as_bytes()),
        }
    }

    /// Serialize the private key for persistent storage.
    pub fn private_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(*self.private)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

fn builder(keypair: &Keypair) -> Result<Builder<'_>, CryptoError> {
    let params = NOISE_PATTERN.parse().map_err(|_| CryptoError::BadPattern)?;
    Ok(Builder::new(params)
        .local_private_key(&keypair.private[..])
        .prologue(PROLOGUE))
}

fn remote_static(state: &HandshakeState) -> Result<PublicKey, CryptoError> {
    state
        .get_remote_static()
        .and_then(PublicKey::from_slice)
        .ok_or(CryptoError::MissingRemoteStatic)
}

// ── Noise Handshake ───────────────────────────────────────────────────────────

/// Initiator (dialer) side of the Noise_XX handshake.
///
/// Sends message 1, receives message 2, sends message 3.
pub struct NoiseInitiator {
    state: HandshakeState,
}

impl NoiseInitiator {
    /// Begin a handshake as the initiator.
    ///
    /// Returns the initiator state and the bytes of message 1.
    pub fn new(keypair: &Keypair) -> Result<(Self, Vec<u8>), CryptoError> {
        let mut state = builder(keypair)?
            .build_initiator()
            .map_err(CryptoError::Noise)?;

        let mut msg1 = vec![0u8; HANDSHAKE_BUF_LEN];
        let len = state.write_message(&[], &mut msg1).map_err(CryptoError::Noise)?;
        msg1.truncate(len);

        Ok((Self { state }, msg1))
    }

    /// Process the responder's message 2 and complete the handshake.
    ///
    /// The responder's static key is checked against `expected` before
    /// message 3 is produced, so a mismatched listener never learns who
    /// dialed it.
    pub fn finish(
        mut self,
        msg2: &[u8],
        expected: Option<&ExpectedIdentity>,
    ) -> Result<(NoiseTransport, Vec<u8>), CryptoError> {
        let mut payload = vec![0u8; msg2.len().max(HANDSHAKE_BUF_LEN)];
        self.state
            .read_message(msg2, &mut payload)
            .map_err(CryptoError::Noise)?;

        let remote = remote_static(&self.state)?;
        if let Some(expected) = expected {
            if !expected.matches(&remote) {
                return Err(CryptoError::IdentityMismatch {
                    expected: expected.to_string(),
                    got: remote,
                });
            }
        }

        let mut msg3 = vec![0u8; HANDSHAKE_BUF_LEN];
        let len = self
            .state
            .write_message(&[], &mut msg3)
            .map_err(CryptoError::Noise)?;
        msg3.truncate(len);

        let transport = NoiseTransport::new(self.state, remote)?;
        Ok((transport, msg3))
    }
}

/// Responder (listener) side of the Noise_XX handshake.
pub struct NoiseResponder {
    state: HandshakeState,
}

impl NoiseResponder {
    /// Begin a handshake as the responder.
    pub fn new(keypair: &Keypair) -> Result<Self, CryptoError> {
        let state = builder(keypair)?
            .build_responder()
            .map_err(CryptoError::Noise)?;
        Ok(Self { state })
    }

    /// Process the initiator's message 1 and write message 2.
    pub fn respond(mut self, msg1: &[u8]) -> Result<(ResponderPending, Vec<u8>), CryptoError> {
        let mut payload = vec![0u8; msg1.len().max(HANDSHAKE_BUF_LEN)];
        self.state
            .read_message(msg1, &mut payload)
            .map_err(CryptoError::Noise)?;

        let mut msg2 = vec![0u8; HANDSHAKE_BUF_LEN];
        let len = self
            .state
            .write_message(&[], &mut msg2)
            .map_err(CryptoError::Noise)?;
        msg2.truncate(len);

        Ok((ResponderPending { state: self.state }, msg2))
    }
}

/// Responder waiting for message 3 from the initiator.
pub struct ResponderPending {
    state: HandshakeState,
}

impl ResponderPending {
    /// Read message 3 and complete the handshake.
    pub fn finish(mut self, msg3: &[u8]) -> Result<NoiseTransport, CryptoError> {
        let mut payload = vec![0u8; msg3.len().max(HANDSHAKE_BUF_LEN)];
        self.state
            .read_message(msg3, &mut payload)
            .map_err(CryptoError::Noise)?;

        let remote = remote_static(&self.state)?;
        NoiseTransport::new(self.state, remote)
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// A completed Noise_XX session.
///
/// Backed by snow's StatelessTransportState so the two directions can be
/// split apart: each half keeps its own nonce counter and the shared cipher
/// state is only ever borrowed immutably. On an ordered stream the nonces are
/// implicit (both sides count messages), so nothing extra goes on the wire.
pub struct NoiseTransport {
    remote: PublicKey,
    state: StatelessTransportState,
}

impl NoiseTransport {
    fn new(state: HandshakeState, remote: PublicKey) -> Result<Self, CryptoError> {
        let state = state
            .into_stateless_transport_mode()
            .map_err(CryptoError::Noise)?;
        Ok(Self { remote, state })
    }

    /// The authenticated static key of the other side.
    pub fn remote_key(&self) -> PublicKey {
        self.remote
    }

    /// Split into independent receive and send ciphers.
    pub fn split(self) -> (RecvCipher, SendCipher) {
        let state = Arc::new(self.state);
        (
            RecvCipher {
                state: state.clone(),
                nonce: 0,
            },
            SendCipher { state, nonce: 0 },
        )
    }
}

/// Encrypting half of a split [`NoiseTransport`].
pub struct SendCipher {
    state: Arc<StatelessTransportState>,
    nonce: u64,
}

impl SendCipher {
    /// Encrypt `plaintext` into `out`, replacing its contents.
    ///
    /// `out` will be `plaintext.len() + 16` bytes on success.
    pub fn encrypt(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), CryptoError> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(CryptoError::MessageTooLarge(plaintext.len()));
        }
        let nonce = next_nonce(&mut self.nonce)?;
        out.clear();
        out.resize(plaintext.len() + TAG_LEN, 0);
        let written = self
            .state
            .write_message(nonce, plaintext, out)
            .map_err(CryptoError::Noise)?;
        out.truncate(written);
        Ok(())
    }
}

/// Decrypting half of a split [`NoiseTransport`].
pub struct RecvCipher {
    state: Arc<StatelessTransportState>,
    nonce: u64,
}

impl RecvCipher {
    /// Decrypt `ciphertext` into `out`, replacing its contents.
    ///
    /// Returns Err on truncation or MAC failure. A failure leaves the
    /// session unusable: the stream is out of sync from then on.
    pub fn decrypt(&mut self, ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), CryptoError> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::TooShort);
        }
        let nonce = next_nonce(&mut self.nonce)?;
        out.clear();
        out.resize(ciphertext.len(), 0);
        let written = self
            .state
            .read_message(nonce, ciphertext, out)
            .map_err(CryptoError::Noise)?;
        out.truncate(written);
        Ok(())
    }
}

fn next_nonce(counter: &mut u64) -> Result<u64, CryptoError> {
    let nonce = *counter;
    *counter = counter.checked_add(1).ok_or(CryptoError::NonceExhausted)?;
    Ok(nonce)
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid Noise pattern string (this is a bug)")]
    BadPattern,

    #[error("Noise protocol error: {0}")]
    Noise(#[from] snow::Error),

    #[error("handshake finished without a remote static key")]
    MissingRemoteStatic,

    #[error("remote identity mismatch: expected {expected}, got {got}")]
    IdentityMismatch { expected: String, got: PublicKey },

    #[error("message of {0} bytes exceeds the transport limit of {MAX_PLAINTEXT_LEN}")]
    MessageTooLarge(usize),

    #[error("ciphertext too short (need at least 16 bytes of MAC)")]
    TooShort,

    #[error("transport nonce exhausted")]
    NonceExhausted,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
