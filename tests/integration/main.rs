//! peerlink integration test harness.
//!
//! Every test runs whole nodes over real Noise_XX sessions on loopback TCP.
//! Listeners bind 127.0.0.1:0, so tests can run in parallel without
//! coordinating ports.
//!
//!   cargo test --test integration

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};

use peerlink_core::{ExpectedIdentity, PeerAddr, PeerIndex};
use peerlink_net::{
    InboundReader, ListenInfo, NetError, NodeOptions, NoiseTcp, PeerBook, PeerHandle,
    PeerIndexResolver, PeerNode, SessionReader, StaticIdentity,
};

mod messaging;
mod sessions;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Reader that forwards every inbound frame, tagged with the sender's index.
#[derive(Clone)]
pub struct Inbox {
    tx: mpsc::UnboundedSender<(PeerIndex, Bytes)>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<(PeerIndex, Bytes)>>>,
}

impl Inbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next frame, or an error after a second of silence.
    pub async fn next(&self) -> Result<(PeerIndex, Bytes)> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .context("no inbound message within 1s")?
            .context("inbox closed")
    }
}

impl InboundReader for Inbox {
    fn run(
        &self,
        peer: PeerHandle,
        mut reader: Box<dyn SessionReader>,
    ) -> BoxFuture<'static, Result<(), NetError>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            while let Some(frame) = reader.read().await? {
                let _ = tx.send((peer.index, frame));
            }
            Ok(())
        })
    }
}

pub struct TestNode {
    pub node: PeerNode,
    pub inbox: Inbox,
    pub book: Arc<PeerBook>,
    pub info: ListenInfo,
}

impl TestNode {
    /// Address other nodes dial to reach this one.
    pub fn addr(&self) -> PeerAddr {
        PeerAddr::new(
            ExpectedIdentity::Key(self.info.public_key),
            self.info.bound.to_string(),
        )
    }
}

/// Start a node with a fresh identity, listening on an ephemeral loopback port.
pub async fn spawn_node() -> Result<TestNode> {
    spawn_node_with(StaticIdentity::generate()).await
}

pub async fn spawn_node_with(identity: StaticIdentity) -> Result<TestNode> {
    let inbox = Inbox::new();
    let book = Arc::new(PeerBook::new());
    let node = PeerNode::new(
        Arc::new(identity),
        Arc::new(NoiseTcp::new(HANDSHAKE_TIMEOUT)),
        book.clone(),
        Arc::new(inbox.clone()),
        NodeOptions {
            write_timeout: Some(Duration::from_secs(2)),
        },
    );
    let info = node
        .start_listening("127.0.0.1:0")
        .await
        .context("failed to start listener")?;
    Ok(TestNode {
        node,
        inbox,
        book,
        info,
    })
}

/// Poll `check` until it holds, for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait until `node` has exactly `n` connected peers.
pub async fn wait_for_peers(node: &PeerNode, n: usize) -> Result<()> {
    if eventually(|| async move { node.registry().len().await == n }).await {
        Ok(())
    } else {
        anyhow::bail!(
            "expected {} peers, have {}",
            n,
            node.registry().len().await
        )
    }
}

// ── Harness self-checks ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_node_listens_on_loopback() {
    let a = spawn_node().await.unwrap();
    assert!(a.info.bound.ip().is_loopback());
    assert_ne!(a.info.bound.port(), 0);
    assert_eq!(a.node.listen_info(), Some(a.info.clone()));
}
