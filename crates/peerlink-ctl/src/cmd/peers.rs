//! Session management commands.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, delete_json, post_json_body};

#[derive(Deserialize)]
struct IndexResponse {
    index: u32,
}

pub async fn cmd_connect(port: u16, target: &str) -> Result<()> {
    #[derive(Serialize)]
    struct ConnectRequest<'a> {
        target: &'a str,
    }

    let resp: IndexResponse = post_json_body(
        &format!("{}/connect", base_url(port)),
        &ConnectRequest { target },
    )
    .await?;
    println!("✓ Connected as peer {}", resp.index);
    Ok(())
}

pub async fn cmd_reconnect(port: u16, index: u32) -> Result<()> {
    #[derive(Serialize)]
    struct ReconnectRequest {
        index: u32,
    }

    let resp: IndexResponse = post_json_body(
        &format!("{}/reconnect", base_url(port)),
        &ReconnectRequest { index },
    )
    .await?;
    println!("✓ Reconnected peer {}", resp.index);
    Ok(())
}

pub async fn cmd_drop(port: u16, index: u32) -> Result<()> {
    #[derive(Deserialize)]
    struct DropResponse {
        index: u32,
        dropped: bool,
    }

    let resp: DropResponse = delete_json(&format!("{}/peers/{}", base_url(port), index)).await?;
    if resp.dropped {
        println!("✓ Peer {} disconnected", resp.index);
    } else {
        println!("Peer {} is not connected", resp.index);
    }
    Ok(())
}
