//! peerlink-ctl: command-line interface for the peerlink daemon.

mod cmd;

use anyhow::{Context, Result};

const DEFAULT_PORT: u16 = 9448;

fn print_usage() {
    println!("Usage: peerlink-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status               Node identity, listen address, peer count");
    println!("  peers                Connected peers");
    println!("  con <target>         Connect to <identity>@<host>[:port]");
    println!("  recon <index>        Reconnect a known peer by index");
    println!("  say <index> <text>   Send a text message");
    println!("  drop <index>         Disconnect a peer");
    println!("  shutdown             Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

fn parse_index(s: &str) -> Result<u32> {
    s.parse()
        .with_context(|| format!("peer index must be a number, got {s:?}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd::status::cmd_status(port).await,
        ["peers"] => cmd::status::cmd_peers(port).await,
        ["con", target] => cmd::peers::cmd_connect(port, target).await,
        ["recon", index] => cmd::peers::cmd_reconnect(port, parse_index(index)?).await,
        ["drop", index] => cmd::peers::cmd_drop(port, parse_index(index)?).await,
        ["say", index, text @ ..] if !text.is_empty() => {
            cmd::messages::cmd_say(port, parse_index(index)?, &text.join(" ")).await
        }
        ["shutdown"] => cmd::status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
