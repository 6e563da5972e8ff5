use crate::*;

use peerlink_core::crypto::MAX_PLAINTEXT_LEN;
use peerlink_core::wire::split_frame;
use peerlink_core::{MsgType, OutboundEnvelope};

/// Connect `b` to `a` and return (a's index at b, b's index at a).
async fn pair(a: &TestNode, b: &TestNode) -> Result<(PeerIndex, PeerIndex)> {
    let a_at_b = b.node.connect_to_peer(&a.addr()).await?;
    wait_for_peers(&a.node, 1).await?;
    let b_at_a = a.book.resolve(&b.info.public_key, None)?;
    Ok((a_at_b, b_at_a))
}

/// Text chat sent by the dialer reaches the listener, tagged with its index.
#[tokio::test]
async fn test_text_message_delivered() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    let (a_at_b, b_at_a) = pair(&a, &b).await?;

    b.node.send_text(a_at_b, "hello").await?;

    let (from, frame) = a.inbox.next().await?;
    assert_eq!(from, b_at_a);
    let (msg_type, payload) = split_frame(&frame).context("empty frame")?;
    assert_eq!(msg_type, MsgType::TEXT_CHAT);
    assert_eq!(&payload[..], b"hello");
    Ok(())
}

/// Both sides can write on the same session.
#[tokio::test]
async fn test_messages_flow_both_ways() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    let (a_at_b, b_at_a) = pair(&a, &b).await?;

    b.node.send_text(a_at_b, "ping").await?;
    assert_eq!(&a.inbox.next().await?.1[..], b"\x60ping");

    a.node.send_text(b_at_a, "pong").await?;
    let (from, frame) = b.inbox.next().await?;
    assert_eq!(from, a_at_b);
    assert_eq!(&frame[..], b"\x60pong");
    Ok(())
}

/// Protocol messages arrive in exactly the order they were queued.
#[tokio::test]
async fn test_enqueue_order_preserved() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    let (a_at_b, _) = pair(&a, &b).await?;

    let outbox = b.node.outbox();
    let types = [MsgType::DELTA_SIG, MsgType::SIG_REV, MsgType::REV];
    for n in 0u8..100 {
        let msg_type = types[usize::from(n) % types.len()];
        outbox.send(OutboundEnvelope::new(a_at_b, msg_type, vec![n]))?;
    }

    for n in 0u8..100 {
        let (_, frame) = a.inbox.next().await?;
        let (msg_type, payload) = split_frame(&frame).context("empty frame")?;
        assert_eq!(msg_type, types[usize::from(n) % types.len()]);
        assert_eq!(&payload[..], &[n]);
    }
    Ok(())
}

/// Interleaved sends to several peers keep each peer's order.
#[tokio::test]
async fn test_fan_out_keeps_per_peer_order() -> Result<()> {
    let hub = spawn_node().await?;
    let mut spokes = Vec::new();
    let mut indices = Vec::new();
    for _ in 0..3 {
        let spoke = spawn_node().await?;
        indices.push(hub.node.connect_to_peer(&spoke.addr()).await?);
        wait_for_peers(&spoke.node, 1).await?;
        spokes.push(spoke);
    }

    for n in 0u8..20 {
        for &index in &indices {
            hub.node
                .send(OutboundEnvelope::new(index, MsgType::CHAN_DESC, vec![n]))?;
        }
    }

    for spoke in &spokes {
        for n in 0u8..20 {
            let (_, frame) = spoke.inbox.next().await?;
            assert_eq!(&frame[..], &[MsgType::CHAN_DESC.0, n]);
        }
    }
    Ok(())
}

/// A message for an unknown index is dropped without disturbing the queue.
#[tokio::test]
async fn test_message_to_absent_peer_is_dropped() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    let (a_at_b, _) = pair(&a, &b).await?;

    b.node.send(OutboundEnvelope::text(a_at_b + 100, "nobody"))?;
    b.node.send(OutboundEnvelope::text(a_at_b, "somebody"))?;

    assert_eq!(&a.inbox.next().await?.1[..], b"\x60somebody");
    Ok(())
}

/// send_text refuses a peer that is not connected.
#[tokio::test]
async fn test_send_text_requires_connection() -> Result<()> {
    let a = spawn_node().await?;
    assert!(matches!(
        a.node.send_text(7, "hello").await,
        Err(NetError::NotConnected(7))
    ));
    Ok(())
}

/// The largest plaintext a single Noise message can carry goes through.
#[tokio::test]
async fn test_max_size_message_delivered() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    let (a_at_b, _) = pair(&a, &b).await?;

    let payload = vec![0xAB; MAX_PLAINTEXT_LEN - 1];
    b.node
        .send(OutboundEnvelope::new(a_at_b, MsgType::SIG_PROOF, payload.clone()))?;

    let (_, frame) = a.inbox.next().await?;
    assert_eq!(frame.len(), MAX_PLAINTEXT_LEN);
    assert_eq!(&frame[1..], &payload[..]);
    Ok(())
}

/// An oversized message tears down that session only; other peers keep
/// receiving.
#[tokio::test]
async fn test_oversized_message_closes_only_that_session() -> Result<()> {
    let hub = spawn_node().await?;
    let victim = spawn_node().await?;
    let bystander = spawn_node().await?;
    let victim_index = hub.node.connect_to_peer(&victim.addr()).await?;
    let bystander_index = hub.node.connect_to_peer(&bystander.addr()).await?;
    wait_for_peers(&victim.node, 1).await?;

    hub.node.send(OutboundEnvelope::new(
        victim_index,
        MsgType::SIG_PROOF,
        vec![0; MAX_PLAINTEXT_LEN],
    ))?;
    hub.node.send_text(bystander_index, "still here").await?;

    assert_eq!(&bystander.inbox.next().await?.1[..], b"\x60still here");
    wait_for_peers(&victim.node, 0).await?;
    let node = &hub.node;
    assert!(eventually(|| async move { !node.is_connected(victim_index).await }).await);
    assert!(hub.node.is_connected(bystander_index).await);
    Ok(())
}
