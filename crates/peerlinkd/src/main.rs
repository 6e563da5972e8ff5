//! peerlinkd: peerlink node daemon.
//!
//! Usage: peerlinkd [config.toml]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use peerlink_core::config::PeerlinkConfig;
use peerlink_core::PeerAddr;
use peerlink_net::{
    IdentityProvider, KeyFileIdentity, LoggingReader, NodeOptions, NoiseTcp, PeerBook, PeerNode,
    SeedIdentity,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    let config = match std::env::args().nth(1) {
        Some(path) => PeerlinkConfig::load_from(path.as_ref())
            .with_context(|| format!("failed to load config from {path}"))?,
        None => {
            if let Err(e) = PeerlinkConfig::write_default_if_missing() {
                tracing::warn!(error = %e, "failed to write default config");
            }
            PeerlinkConfig::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                PeerlinkConfig::default()
            })
        }
    };
    tracing::info!(listen = %config.network.listen_addr, "peerlinkd starting");

    // Identity
    let identity: Arc<dyn IdentityProvider> = match &config.identity.seed_path {
        Some(seed_path) => Arc::new(
            SeedIdentity::from_file(seed_path).context("failed to derive identity from seed")?,
        ),
        None => Arc::new(KeyFileIdentity::new(config.identity.keypair_path.clone())),
    };
    let keypair = identity.identity_key().context("failed to load identity key")?;
    tracing::info!(public_key = %keypair.public, "identity ready");

    // Peer book
    let book = PeerBook::with_persistence(config.peers.book_path.clone())
        .context("failed to open peer book")?;

    let node = PeerNode::new(
        identity,
        Arc::new(
            NoiseTcp::new(config.network.handshake_timeout())
                .with_accept_backoff(config.network.accept_backoff()),
        ),
        Arc::new(book),
        Arc::new(LoggingReader),
        NodeOptions {
            write_timeout: config.network.write_timeout(),
        },
    );

    let mut shutdown_rx = node.subscribe_shutdown();

    // ── Listener ─────────────────────────────────────────────────────────────

    let info = node
        .start_listening(&config.network.listen_addr)
        .await
        .context("failed to start session listener")?;
    println!("listening on {}", info.bound);
    println!("node address {}", info.address);
    println!("lnid {}", info.fingerprint);

    // ── Ctrl-C → shutdown ────────────────────────────────────────────────────

    {
        let node = node.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("ctrl-c received");
            node.shutdown();
        });
    }

    // ── Startup dials ────────────────────────────────────────────────────────

    for target in &config.network.connect {
        let target: PeerAddr = match target.parse() {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "ignoring malformed peer address");
                continue;
            }
        };
        let node = node.clone();
        tokio::spawn(async move {
            match node.connect_to_peer(&target).await {
                Ok(index) => tracing::info!(peer = index, target = %target, "connected"),
                Err(e) => tracing::warn!(target = %target, error = %e, "startup dial failed"),
            }
        });
    }

    // ── API ──────────────────────────────────────────────────────────────────

    let api_task = {
        let state = peerlink_api::ApiState { node: node.clone() };
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = peerlink_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Peer printer ─────────────────────────────────────────────────────────

    let peer_printer = {
        let node = node.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            interval.tick().await;
            loop {
                interval.tick().await;
                let peers = node.list_connected_peers().await;
                tracing::info!(peers = peers.len(), "connected peers");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = api_task           => tracing::error!("API task exited: {:?}", r),
        r = peer_printer       => tracing::error!("peer printer exited: {:?}", r),
    }

    Ok(())
}
