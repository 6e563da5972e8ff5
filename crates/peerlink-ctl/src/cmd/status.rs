//! Status, peer listing and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

#[derive(Deserialize)]
struct StatusResponse {
    public_key: String,
    address: String,
    fingerprint: String,
    listen_addr: Option<String>,
    peers: usize,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    index: u32,
    remote_host: String,
}

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  peerlink Node Status");
    println!("═══════════════════════════════════════");
    println!("  Address     : {}", resp.address);
    println!("  Fingerprint : {}", resp.fingerprint);
    println!("  Public key  : {}", resp.public_key);
    println!(
        "  Listening   : {}",
        resp.listen_addr.as_deref().unwrap_or("(not listening)")
    );
    println!("  Peers       : {}", resp.peers);

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No connected peers.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Connected Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");
    for p in &resp.peers {
        println!("  {:>5}  {}", p.index, p.remote_host);
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ShutdownResponse {
        message: String,
    }

    let resp: ShutdownResponse =
        post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
