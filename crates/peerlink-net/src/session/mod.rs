//! Session abstraction: authenticated, encrypted point-to-point channels.
//!
//! The peer layer never touches sockets or ciphers directly. It asks a
//! [`Transport`] to bind an [`Acceptor`] or dial a remote, and gets back a
//! [`Session`]: the remote's authenticated identity and address plus
//! independent read and write halves. The read half goes to the peer's
//! inbound reader task, the write half stays in the registry for the
//! dispatcher. A transport must therefore allow both halves to be driven
//! concurrently.
//!
//! The traits return boxed futures so transports can be swapped at runtime
//! behind `Arc<dyn Transport>`.

pub mod noise;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

use peerlink_core::crypto::CryptoError;
use peerlink_core::{ExpectedIdentity, Keypair, PublicKey};

/// Opens sessions: binds acceptors and dials remotes.
pub trait Transport: Send + Sync + 'static {
    /// Bind an acceptor on `addr`, authenticating as `keypair`.
    fn listen<'a>(
        &'a self,
        keypair: Arc<Keypair>,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn Acceptor>, SessionError>>;

    /// Dial `addr` and complete the handshake. When `expected` is given the
    /// remote's static key must match it or the handshake fails.
    fn dial<'a>(
        &'a self,
        keypair: Arc<Keypair>,
        addr: &'a str,
        expected: Option<ExpectedIdentity>,
    ) -> BoxFuture<'a, Result<Session, SessionError>>;
}

/// Yields inbound sessions with completed handshakes.
pub trait Acceptor: Send + Sync + 'static {
    /// Wait for the next inbound session. An Err describes one failed
    /// attempt; the acceptor stays usable unless it returns `Closed`.
    fn accept(&mut self) -> BoxFuture<'_, Result<Session, SessionError>>;

    fn local_addr(&self) -> SocketAddr;
}

/// Read half of a session.
pub trait SessionReader: Send + 'static {
    /// Next decrypted message, or None once the remote closed cleanly.
    fn read(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, SessionError>>;
}

/// Write half of a session.
pub trait SessionWriter: Send + 'static {
    /// Encrypt and send one message. Returns the plaintext bytes written.
    fn write<'a>(&'a mut self, msg: &'a [u8]) -> BoxFuture<'a, Result<usize, SessionError>>;

    /// Close the write direction. The remote sees end-of-stream.
    fn shutdown(&mut self) -> BoxFuture<'_, Result<(), SessionError>>;
}

/// An established session with one remote node.
pub struct Session {
    remote_key: PublicKey,
    remote_addr: SocketAddr,
    reader: Box<dyn SessionReader>,
    writer: Box<dyn SessionWriter>,
}

impl Session {
    pub fn new(
        remote_key: PublicKey,
        remote_addr: SocketAddr,
        reader: Box<dyn SessionReader>,
        writer: Box<dyn SessionWriter>,
    ) -> Self {
        Self {
            remote_key,
            remote_addr,
            reader,
            writer,
        }
    }

    /// The remote's authenticated static key.
    pub fn remote_public_key(&self) -> PublicKey {
        self.remote_key
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn into_split(self) -> (Box<dyn SessionReader>, Box<dyn SessionWriter>) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("remote_key", &self.remote_key)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Crypto(#[from] CryptoError),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("handshake message of {0} bytes exceeds the limit")]
    HandshakeTooLarge(usize),

    #[error("write timed out")]
    WriteTimeout,

    #[error("session closed")]
    Closed,
}
