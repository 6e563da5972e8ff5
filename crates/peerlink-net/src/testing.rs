//! In-memory sessions for unit tests.
//!
//! Writers append `(tag, bytes)` to a shared [`WireLog`], so a test can check
//! the global order in which the dispatcher put messages on the "wire".
//! Readers are fed through an unbounded channel; dropping the feed is a
//! clean EOF.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use peerlink_core::crypto::CryptoError;
use peerlink_core::{ExpectedIdentity, Keypair, PeerIndex, PublicKey};

use crate::error::NetError;
use crate::reader::InboundReader;
use crate::registry::PeerHandle;
use crate::session::{Acceptor, Session, SessionError, SessionReader, SessionWriter, Transport};

pub(crate) type Feed = mpsc::UnboundedSender<Result<Bytes, SessionError>>;

#[derive(Default)]
struct WireLogInner {
    writes: Vec<(String, Vec<u8>)>,
    shut: HashSet<String>,
}

#[derive(Clone, Default)]
pub(crate) struct WireLog(Arc<Mutex<WireLogInner>>);

impl WireLog {
    pub fn writes(&self) -> Vec<(String, Vec<u8>)> {
        self.0.lock().unwrap().writes.clone()
    }

    pub fn writes_to(&self, tag: &str) -> Vec<Vec<u8>> {
        self.writes()
            .into_iter()
            .filter(|(t, _)| t == tag)
            .map(|(_, b)| b)
            .collect()
    }

    pub fn was_shut_down(&self, tag: &str) -> bool {
        self.0.lock().unwrap().shut.contains(tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriterMode {
    Healthy,
    /// Every write fails with a broken pipe.
    Broken,
    /// Every write waits forever.
    Stalled,
}

struct MemoryWriter {
    tag: String,
    log: WireLog,
    mode: WriterMode,
    shut: bool,
}

impl SessionWriter for MemoryWriter {
    fn write<'a>(&'a mut self, msg: &'a [u8]) -> BoxFuture<'a, Result<usize, SessionError>> {
        Box::pin(async move {
            if self.shut {
                return Err(SessionError::Closed);
            }
            match self.mode {
                WriterMode::Healthy => {
                    let mut inner = self.log.0.lock().unwrap();
                    inner.writes.push((self.tag.clone(), msg.to_vec()));
                    Ok(msg.len())
                }
                WriterMode::Broken => Err(SessionError::Io(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                ))),
                WriterMode::Stalled => futures::future::pending().await,
            }
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<(), SessionError>> {
        Box::pin(async move {
            self.shut = true;
            self.log.0.lock().unwrap().shut.insert(self.tag.clone());
            Ok(())
        })
    }
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Result<Bytes, SessionError>>,
}

impl SessionReader for MemoryReader {
    fn read(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, SessionError>> {
        Box::pin(async move { self.rx.recv().await.transpose() })
    }
}

pub(crate) fn memory_writer(tag: &str, log: &WireLog) -> Box<dyn SessionWriter> {
    memory_writer_with(tag, log, WriterMode::Healthy)
}

pub(crate) fn memory_writer_with(
    tag: &str,
    log: &WireLog,
    mode: WriterMode,
) -> Box<dyn SessionWriter> {
    Box::new(MemoryWriter {
        tag: tag.to_string(),
        log: log.clone(),
        mode,
        shut: false,
    })
}

pub(crate) fn memory_reader() -> (Box<dyn SessionReader>, Feed) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Box::new(MemoryReader { rx }), tx)
}

/// A session whose writes land in `log` under `tag`.
pub(crate) fn memory_session(
    remote_key: PublicKey,
    remote_addr: SocketAddr,
    tag: &str,
    log: &WireLog,
    mode: WriterMode,
) -> (Session, Feed) {
    let (reader, feed) = memory_reader();
    let session = Session::new(
        remote_key,
        remote_addr,
        reader,
        memory_writer_with(tag, log, mode),
    );
    (session, feed)
}

// ── Transport ─────────────────────────────────────────────────────────────────

struct ChannelAcceptor {
    rx: mpsc::UnboundedReceiver<Result<Session, SessionError>>,
}

impl Acceptor for ChannelAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, Result<Session, SessionError>> {
        Box::pin(async move { self.rx.recv().await.unwrap_or(Err(SessionError::Closed)) })
    }

    fn local_addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 2448))
    }
}

/// Dialable remote registered with [`MemoryTransport::add_remote`].
struct Remote {
    key: PublicKey,
    mode: WriterMode,
}

/// Inbound sessions are injected by the test; dials succeed against
/// registered remotes and write to the shared log under the dialed address.
pub(crate) struct MemoryTransport {
    log: WireLog,
    acceptor: Mutex<Option<ChannelAcceptor>>,
    remotes: Mutex<HashMap<String, Remote>>,
    feeds: Mutex<HashMap<String, Feed>>,
}

impl MemoryTransport {
    pub fn new(log: &WireLog) -> (Self, mpsc::UnboundedSender<Result<Session, SessionError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self {
            log: log.clone(),
            acceptor: Mutex::new(Some(ChannelAcceptor { rx })),
            remotes: Mutex::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
        };
        (transport, tx)
    }

    pub fn add_remote(&self, addr: &str, key: PublicKey, mode: WriterMode) {
        self.remotes
            .lock()
            .unwrap()
            .insert(addr.to_string(), Remote { key, mode });
    }

    /// Feed of the most recent session dialed to `addr`.
    pub fn take_feed(&self, addr: &str) -> Option<Feed> {
        self.feeds.lock().unwrap().remove(addr)
    }
}

impl Transport for MemoryTransport {
    fn listen<'a>(
        &'a self,
        _keypair: Arc<Keypair>,
        _addr: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn Acceptor>, SessionError>> {
        Box::pin(async move {
            let acceptor = self.acceptor.lock().unwrap().take().ok_or(SessionError::Closed)?;
            Ok(Box::new(acceptor) as Box<dyn Acceptor>)
        })
    }

    fn dial<'a>(
        &'a self,
        _keypair: Arc<Keypair>,
        addr: &'a str,
        expected: Option<ExpectedIdentity>,
    ) -> BoxFuture<'a, Result<Session, SessionError>> {
        Box::pin(async move {
            let (key, mode) = {
                let remotes = self.remotes.lock().unwrap();
                let remote = remotes.get(addr).ok_or_else(|| {
                    SessionError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
                })?;
                (remote.key, remote.mode)
            };
            if let Some(expected) = expected {
                if !expected.matches(&key) {
                    return Err(CryptoError::IdentityMismatch {
                        expected: expected.to_string(),
                        got: key,
                    }
                    .into());
                }
            }
            let remote_addr: SocketAddr = addr.parse().unwrap_or(SocketAddr::from(([127, 0, 0, 1], 1)));
            let (session, feed) = memory_session(key, remote_addr, addr, &self.log, mode);
            self.feeds.lock().unwrap().insert(addr.to_string(), feed);
            Ok(session)
        })
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Records every inbound message as `(peer index, bytes)`.
#[derive(Clone, Default)]
pub(crate) struct RecordingReader {
    received: Arc<Mutex<Vec<(PeerIndex, Vec<u8>)>>>,
    started: Arc<Mutex<Vec<PeerHandle>>>,
}

impl RecordingReader {
    pub fn received(&self) -> Vec<(PeerIndex, Vec<u8>)> {
        self.received.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<PeerHandle> {
        self.started.lock().unwrap().clone()
    }
}

impl InboundReader for RecordingReader {
    fn run(
        &self,
        peer: PeerHandle,
        mut reader: Box<dyn SessionReader>,
    ) -> BoxFuture<'static, Result<(), NetError>> {
        self.started.lock().unwrap().push(peer);
        let received = self.received.clone();
        Box::pin(async move {
            while let Some(msg) = reader.read().await? {
                received.lock().unwrap().push((peer.index, msg.to_vec()));
            }
            Ok(())
        })
    }
}

/// Poll `check` until it holds or a second passes.
pub(crate) async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    false
}
