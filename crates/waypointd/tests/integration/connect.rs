use crate::*;

#[tokio::test]
async fn connect_registers_peer() {
    let (server, addr) = start_server(test_config()).await;
    let mut peer = TestPeer::open(addr).await;

    let logical = LogicalAddr::random();
    let status = peer
        .connect("cluster", logical, Some("node-1"), Some(physical(7800)))
        .await;
    assert_eq!(status, command::CONNECT_OK);

    let state = server.state();
    assert!(state.routing.find("cluster", &logical).is_some());
    assert_eq!(state.mappings.get(&logical), Some(physical(7800)));
    assert_eq!(state.names.get(&logical).as_deref(), Some("node-1"));

    server.stop().await;
}

#[tokio::test]
async fn single_peer_join_then_leave() {
    let (server, addr) = start_server(test_config()).await;
    let mut peer = TestPeer::open(addr).await;

    let logical = LogicalAddr::random();
    assert_eq!(
        peer.connect("g", logical, Some("p"), Some(physical(7800))).await,
        command::CONNECT_OK
    );
    assert_eq!(peer.disconnect("g", logical).await, command::DISCONNECT_OK);

    // The reply is written after removal, so the state is already settled.
    let state = server.state();
    assert!(!state.routing.contains_group("g"));
    assert_eq!(state.mappings.get(&logical), None);

    server.stop().await;
}

#[tokio::test]
async fn connect_without_name_binds_nothing() {
    let (server, addr) = start_server(test_config()).await;
    let mut peer = TestPeer::open(addr).await;

    let logical = LogicalAddr::random();
    assert_eq!(
        peer.connect("g", logical, None, Some(physical(7800))).await,
        command::CONNECT_OK
    );
    assert_eq!(server.state().names.get(&logical), None);

    server.stop().await;
}

#[tokio::test]
async fn connect_without_addr_fails_and_tears_down() {
    let (server, addr) = start_server(test_config()).await;
    let mut peer = TestPeer::open(addr).await;

    peer.send(&GossipRecord {
        group: Some("g".into()),
        ..GossipRecord::new(command::CONNECT)
    })
    .await;
    assert_eq!(peer.recv_status().await, command::OP_FAIL);
    peer.expect_eof().await;

    server.stop().await;
}

#[tokio::test]
async fn disconnect_without_addr_answers_op_fail() {
    let (server, addr) = start_server(test_config()).await;
    let mut peer = TestPeer::open(addr).await;

    let logical = LogicalAddr::random();
    assert_eq!(
        peer.connect("g", logical, None, Some(physical(7800))).await,
        command::CONNECT_OK
    );
    peer.send(&GossipRecord {
        group: Some("g".into()),
        ..GossipRecord::new(command::DISCONNECT)
    })
    .await;
    assert_eq!(peer.recv_status().await, command::OP_FAIL);

    // The session survives a failed disconnect.
    assert!(server.state().routing.find("g", &logical).is_some());

    server.stop().await;
}

#[tokio::test]
async fn duplicate_connect_supersedes_prior_session() {
    let (server, addr) = start_server(test_config()).await;
    let logical = LogicalAddr::random();

    let mut first = TestPeer::open(addr).await;
    assert_eq!(
        first.connect("g", logical, Some("p"), Some(physical(7800))).await,
        command::CONNECT_OK
    );

    // Same logical address from a fresh socket: the old session is closed
    // before the new CONNECT_OK is sent.
    let mut second = TestPeer::open(addr).await;
    assert_eq!(
        second.connect("g", logical, Some("p"), Some(physical(7801))).await,
        command::CONNECT_OK
    );
    first.expect_eof().await;

    assert!(server.state().routing.find("g", &logical).is_some());

    // Traffic for the address now lands on the new session.
    let sender = LogicalAddr::random();
    let mut third = TestPeer::open(addr).await;
    assert_eq!(
        third.connect("g", sender, None, Some(physical(7802))).await,
        command::CONNECT_OK
    );
    third.message("g", Some(logical), b"ahoy").await;

    let delivered = second.recv_record().await;
    assert_eq!(delivered.command, command::MESSAGE);
    assert_eq!(delivered.addr, Some(logical));
    assert_eq!(delivered.payload.as_deref(), Some(b"ahoy".as_ref()));

    server.stop().await;
}

#[tokio::test]
async fn one_session_can_register_many_addresses() {
    let (server, addr) = start_server(test_config()).await;
    let mut peer = TestPeer::open(addr).await;

    let a = LogicalAddr::random();
    let b = LogicalAddr::random();
    assert_eq!(
        peer.connect("g1", a, None, Some(physical(7800))).await,
        command::CONNECT_OK
    );
    assert_eq!(
        peer.connect("g2", b, None, Some(physical(7800))).await,
        command::CONNECT_OK
    );

    let state = server.state();
    assert!(state.routing.find("g1", &a).is_some());
    assert!(state.routing.find("g2", &b).is_some());

    server.stop().await;
}
