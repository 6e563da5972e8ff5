use crate::*;

use peerlink_core::address::key_hash;

/// Connecting installs the peer on both sides, each under its own index.
#[tokio::test]
async fn test_connect_installs_both_sides() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;

    let a_at_b = b.node.connect_to_peer(&a.addr()).await?;
    assert!(b.node.is_connected(a_at_b).await);
    wait_for_peers(&a.node, 1).await?;

    let b_at_a = a.book.resolve(&b.info.public_key, None)?;
    assert!(a.node.is_connected(b_at_a).await);

    // Only the dialer learned a redialable host.
    assert_eq!(
        b.book.lookup(a_at_b).and_then(|r| r.host),
        Some(a.info.bound.to_string())
    );
    assert_eq!(a.book.lookup(b_at_a).and_then(|r| r.host), None);
    Ok(())
}

/// A key-hash address authenticates the same way a full key does.
#[tokio::test]
async fn test_connect_by_node_address() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;

    let target: PeerAddr = format!("{}@{}", a.info.address, a.info.bound).parse()?;
    assert_eq!(
        target.identity,
        ExpectedIdentity::KeyHash(key_hash(&a.info.public_key))
    );
    b.node.connect_to_peer(&target).await?;
    wait_for_peers(&a.node, 1).await?;
    Ok(())
}

/// Several peers dialing at once all end up installed under distinct indices.
#[tokio::test]
async fn test_concurrent_inbound_peers() -> Result<()> {
    let hub = spawn_node().await?;
    let mut spokes = Vec::new();
    for _ in 0..5 {
        spokes.push(spawn_node().await?);
    }

    let target = hub.addr();
    let dials = spokes
        .iter()
        .map(|s| s.node.connect_to_peer(&target))
        .collect::<Vec<_>>();
    for result in futures::future::join_all(dials).await {
        result?;
    }

    wait_for_peers(&hub.node, 5).await?;
    let mut indices: Vec<PeerIndex> = hub
        .node
        .list_connected_peers()
        .await
        .into_iter()
        .map(|p| p.index)
        .collect();
    indices.sort_unstable();
    indices.dedup();
    assert_eq!(indices.len(), 5);
    Ok(())
}

/// The same key keeps its index across disconnects and redials.
#[tokio::test]
async fn test_index_stable_across_reconnects() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;

    let first = b.node.connect_to_peer(&a.addr()).await?;
    wait_for_peers(&a.node, 1).await?;
    let b_at_a = a.book.resolve(&b.info.public_key, None)?;

    assert!(b.node.disconnect(first).await);
    wait_for_peers(&a.node, 0).await?;

    let second = b.node.connect_to_peer(&a.addr()).await?;
    assert_eq!(first, second);
    wait_for_peers(&a.node, 1).await?;
    assert!(a.node.is_connected(b_at_a).await);
    assert_eq!(a.book.len(), 1);
    Ok(())
}

/// Reconnect by index redials the host recorded on the first connect.
#[tokio::test]
async fn test_reconnect_by_index() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;

    let index = b.node.connect_to_peer(&a.addr()).await?;
    b.node.disconnect(index).await;
    assert!(!b.node.is_connected(index).await);

    assert_eq!(b.node.reconnect(index).await?, index);
    assert!(b.node.is_connected(index).await);
    wait_for_peers(&a.node, 1).await?;
    Ok(())
}

/// Dialing a peer that is already connected replaces the old session.
#[tokio::test]
async fn test_duplicate_connect_replaces_session() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;

    let first = b.node.connect_to_peer(&a.addr()).await?;
    let old = b.node.registry().handle(first).await.context("missing entry")?;
    let second = b.node.connect_to_peer(&a.addr()).await?;
    assert_eq!(first, second);

    let new = b.node.registry().handle(second).await.context("missing entry")?;
    assert_ne!(old.connection_id, new.connection_id);
    assert_eq!(b.node.registry().len().await, 1);

    // The replaced session's teardown must not evict its successor.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(b.node.is_connected(second).await);
    wait_for_peers(&a.node, 1).await?;
    Ok(())
}

/// One node dialing two peers at once ends up with two distinct entries.
#[tokio::test]
async fn test_concurrent_outbound_dials() -> Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    let c = spawn_node().await?;

    let (b_addr, c_addr) = (b.addr(), c.addr());
    let (to_b, to_c) = tokio::join!(
        a.node.connect_to_peer(&b_addr),
        a.node.connect_to_peer(&c_addr)
    );
    let (to_b, to_c) = (to_b?, to_c?);
    assert_ne!(to_b, to_c);

    let mut peers = a.node.list_connected_peers().await;
    peers.sort_by_key(|p| p.index);
    let mut expected = vec![(to_b, b.info.bound.to_string()), (to_c, c.info.bound.to_string())];
    expected.sort();
    let listed: Vec<_> = peers.into_iter().map(|p| (p.index, p.remote_host)).collect();
    assert_eq!(listed, expected);
    Ok(())
}

/// With no connects or drops in between, two listings agree.
#[tokio::test]
async fn test_listing_is_stable_without_changes() -> Result<()> {
    let hub = spawn_node().await?;
    let mut spokes = Vec::new();
    for _ in 0..3 {
        let spoke = spawn_node().await?;
        hub.node.connect_to_peer(&spoke.addr()).await?;
        spokes.push(spoke);
    }

    let node = &hub.node;
    let listing = || async move {
        let mut set: Vec<(PeerIndex, String)> = node
            .list_connected_peers()
            .await
            .into_iter()
            .map(|p| (p.index, p.remote_host))
            .collect();
        set.sort();
        set
    };
    let first = listing().await;
    let second = listing().await;
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    Ok(())
}
