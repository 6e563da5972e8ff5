//! Text chat command.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

pub async fn cmd_say(port: u16, index: u32, text: &str) -> Result<()> {
    #[derive(Serialize)]
    struct SayRequest<'a> {
        index: u32,
        text: &'a str,
    }

    #[derive(Deserialize)]
    struct SayResponse {
        queued: bool,
    }

    let resp: SayResponse = post_json_body(
        &format!("{}/say", base_url(port)),
        &SayRequest { index, text },
    )
    .await?;
    if resp.queued {
        println!("✓ Message queued for peer {}", index);
    }
    Ok(())
}
