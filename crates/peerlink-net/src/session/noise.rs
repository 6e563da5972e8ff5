//! Noise_XX over TCP, the default [`Transport`].
//!
//! Every Noise message, handshake or transport, travels as one frame:
//!
//!   length (u16 BE) || body
//!
//! The handshake is three frames (→ e, ← e ee s es, → s se). After it the
//! stream is split: the read half and a [`RecvCipher`] go to the reader task,
//! the write half and a [`SendCipher`] stay with the registry. Nonces are
//! implicit message counters, so nothing but ciphertext goes on the wire.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use peerlink_core::crypto::{
    CryptoError, NoiseInitiator, NoiseResponder, NoiseTransport, RecvCipher, SendCipher,
};
use peerlink_core::{ExpectedIdentity, Keypair};

use super::{Acceptor, Session, SessionError, SessionReader, SessionWriter, Transport};

/// XX handshake messages are at most 96 bytes; anything past this is garbage.
const MAX_NOISE_HANDSHAKE_LEN: usize = 1024;

/// Completed inbound handshakes waiting for `accept()`.
const ACCEPT_BACKLOG: usize = 64;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Noise_XX_25519_ChaChaPoly_BLAKE2s over TCP.
#[derive(Debug, Clone)]
pub struct NoiseTcp {
    handshake_timeout: Duration,
    accept_backoff: Option<Duration>,
}

impl NoiseTcp {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            accept_backoff: None,
        }
    }

    /// Pause for `backoff` after a failed `accept(2)`. Off by default: a
    /// failed accept is reported and the loop goes straight back to
    /// accepting.
    pub fn with_accept_backoff(mut self, backoff: Option<Duration>) -> Self {
        self.accept_backoff = backoff;
        self
    }
}

impl Default for NoiseTcp {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

impl Transport for NoiseTcp {
    fn listen<'a>(
        &'a self,
        keypair: Arc<Keypair>,
        addr: &'a str,
    ) -> BoxFuture<'a, Result<Box<dyn Acceptor>, SessionError>> {
        Box::pin(async move {
            let listener = TcpListener::bind(addr).await?;
            let local_addr = listener.local_addr()?;
            let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
            let task = tokio::spawn(accept_loop(
                listener,
                keypair,
                self.handshake_timeout,
                self.accept_backoff,
                tx,
            ));
            Ok(Box::new(NoiseAcceptor {
                local_addr,
                incoming: rx,
                task,
            }) as Box<dyn Acceptor>)
        })
    }

    fn dial<'a>(
        &'a self,
        keypair: Arc<Keypair>,
        addr: &'a str,
        expected: Option<ExpectedIdentity>,
    ) -> BoxFuture<'a, Result<Session, SessionError>> {
        Box::pin(async move {
            let attempt = async {
                let stream = TcpStream::connect(addr).await?;
                handshake(&keypair, stream, expected.as_ref()).await
            };
            match timeout(self.handshake_timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::HandshakeTimeout),
            }
        })
    }
}

// ── Acceptor ──────────────────────────────────────────────────────────────────

struct NoiseAcceptor {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<Result<Session, SessionError>>,
    task: JoinHandle<()>,
}

impl Acceptor for NoiseAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, Result<Session, SessionError>> {
        Box::pin(async move { self.incoming.recv().await.unwrap_or(Err(SessionError::Closed)) })
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for NoiseAcceptor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Accept TCP connections and run each handshake on its own task, so a
/// client that stalls mid-handshake never holds up the others.
async fn accept_loop(
    listener: TcpListener,
    keypair: Arc<Keypair>,
    handshake_timeout: Duration,
    accept_backoff: Option<Duration>,
    tx: mpsc::Sender<Result<Session, SessionError>>,
) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                if tx.send(Err(e.into())).await.is_err() {
                    return;
                }
                if let Some(backoff) = accept_backoff {
                    tokio::time::sleep(backoff).await;
                }
                continue;
            }
        };

        let keypair = keypair.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let peer = stream.peer_addr().ok();
            let result = match timeout(handshake_timeout, on_handshake(&keypair, stream)).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::HandshakeTimeout),
            };
            if let Err(e) = &result {
                tracing::debug!(addr = ?peer, error = %e, "inbound handshake failed");
            }
            // Acceptor gone: the session is dropped and the socket closes.
            let _ = tx.send(result).await;
        });
    }
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Initiator side: → e, ← e ee s es, → s se.
async fn handshake(
    keypair: &Keypair,
    mut stream: TcpStream,
    expected: Option<&ExpectedIdentity>,
) -> Result<Session, SessionError> {
    stream.set_nodelay(true)?;
    let remote_addr = stream.peer_addr()?;

    let (initiator, msg1) = NoiseInitiator::new(keypair)?;
    send_handshake(&mut stream, &msg1).await?;
    let msg2 = recv_handshake(&mut stream).await?;
    let (transport, msg3) = initiator.finish(&msg2, expected)?;
    send_handshake(&mut stream, &msg3).await?;

    Ok(into_session(stream, remote_addr, transport))
}

/// Responder side of [`handshake`].
async fn on_handshake(keypair: &Keypair, mut stream: TcpStream) -> Result<Session, SessionError> {
    stream.set_nodelay(true)?;
    let remote_addr = stream.peer_addr()?;

    let responder = NoiseResponder::new(keypair)?;
    let msg1 = recv_handshake(&mut stream).await?;
    let (pending, msg2) = responder.respond(&msg1)?;
    send_handshake(&mut stream, &msg2).await?;
    let msg3 = recv_handshake(&mut stream).await?;
    let transport = pending.finish(&msg3)?;

    Ok(into_session(stream, remote_addr, transport))
}

fn into_session(stream: TcpStream, remote_addr: SocketAddr, transport: NoiseTransport) -> Session {
    let remote_key = transport.remote_key();
    let (recv, send) = transport.split();
    let (read_half, write_half) = stream.into_split();
    Session::new(
        remote_key,
        remote_addr,
        Box::new(NoiseReader {
            stream: read_half,
            cipher: recv,
            frame: Vec::new(),
        }),
        Box::new(NoiseWriter {
            stream: write_half,
            cipher: send,
            ciphertext: Vec::new(),
            frame: Vec::new(),
        }),
    )
}

async fn send_handshake(stream: &mut TcpStream, msg: &[u8]) -> Result<(), SessionError> {
    let mut frame = Vec::with_capacity(2 + msg.len());
    put_frame(&mut frame, msg)?;
    stream.write_all(&frame).await?;
    Ok(())
}

async fn recv_handshake(stream: &mut TcpStream) -> Result<Vec<u8>, SessionError> {
    let len = usize::from(stream.read_u16().await?);
    if len > MAX_NOISE_HANDSHAKE_LEN {
        return Err(SessionError::HandshakeTooLarge(len));
    }
    let mut msg = vec![0u8; len];
    stream.read_exact(&mut msg).await?;
    Ok(msg)
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// Append `body` to `out` with its u16 length prefix.
fn put_frame(out: &mut Vec<u8>, body: &[u8]) -> Result<(), CryptoError> {
    let len = u16::try_from(body.len()).map_err(|_| CryptoError::MessageTooLarge(body.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(())
}

/// Read one frame into `buf`. Returns false on a clean EOF before the first
/// length byte; EOF anywhere else is an error.
async fn read_frame<R: AsyncRead + Unpin>(r: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    let mut len = [0u8; 2];
    match r.read(&mut len).await? {
        0 => return Ok(false),
        1 => {
            r.read_exact(&mut len[1..]).await?;
        }
        _ => {}
    }
    buf.clear();
    buf.resize(usize::from(u16::from_be_bytes(len)), 0);
    r.read_exact(buf).await?;
    Ok(true)
}

// ── Session halves ────────────────────────────────────────────────────────────

struct NoiseReader {
    stream: OwnedReadHalf,
    cipher: RecvCipher,
    frame: Vec<u8>,
}

impl SessionReader for NoiseReader {
    fn read(&mut self) -> BoxFuture<'_, Result<Option<Bytes>, SessionError>> {
        Box::pin(async move {
            if !read_frame(&mut self.stream, &mut self.frame).await? {
                return Ok(None);
            }
            let mut plaintext = Vec::with_capacity(self.frame.len());
            self.cipher.decrypt(&self.frame, &mut plaintext)?;
            Ok(Some(Bytes::from(plaintext)))
        })
    }
}

struct NoiseWriter {
    stream: OwnedWriteHalf,
    cipher: SendCipher,
    ciphertext: Vec<u8>,
    frame: Vec<u8>,
}

impl SessionWriter for NoiseWriter {
    fn write<'a>(&'a mut self, msg: &'a [u8]) -> BoxFuture<'a, Result<usize, SessionError>> {
        Box::pin(async move {
            self.cipher.encrypt(msg, &mut self.ciphertext)?;
            self.frame.clear();
            put_frame(&mut self.frame, &self.ciphertext)?;
            self.stream.write_all(&self.frame).await?;
            Ok(msg.len())
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<(), SessionError>> {
        Box::pin(async move {
            self.stream.shutdown().await?;
            Ok(())
        })
    }
}
