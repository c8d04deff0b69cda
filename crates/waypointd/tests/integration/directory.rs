use crate::*;

#[tokio::test]
async fn directory_query_lists_group_members() {
    let (server, addr) = start_server(test_config()).await;

    let a1 = LogicalAddr::random();
    let a2 = LogicalAddr::random();
    let mut p1 = TestPeer::open(addr).await;
    let mut p2 = TestPeer::open(addr).await;
    assert_eq!(
        p1.connect("g", a1, Some("p1"), Some(physical(7801))).await,
        command::CONNECT_OK
    );
    assert_eq!(
        p2.connect("g", a2, Some("p2"), Some(physical(7802))).await,
        command::CONNECT_OK
    );

    // A third peer can query without registering anything.
    let mut q = TestPeer::open(addr).await;
    let members = q.members("g").await;
    assert_eq!(members.len(), 2);

    for member in &members {
        assert!(member.is_server);
        let logical = member.addr.expect("member entry carries an address");
        if logical == a1 {
            assert_eq!(member.logical_name.as_deref(), Some("p1"));
            assert_eq!(member.physical, Some(physical(7801)));
        } else if logical == a2 {
            assert_eq!(member.logical_name.as_deref(), Some("p2"));
            assert_eq!(member.physical, Some(physical(7802)));
        } else {
            panic!("unexpected member {logical}");
        }
    }

    server.stop().await;
}

#[tokio::test]
async fn directory_query_on_unknown_group_is_empty() {
    let (server, addr) = start_server(test_config()).await;
    let mut q = TestPeer::open(addr).await;
    assert!(q.members("nobody-here").await.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn directory_reflects_disconnect() {
    let (server, addr) = start_server(test_config()).await;

    let a1 = LogicalAddr::random();
    let a2 = LogicalAddr::random();
    let mut p1 = TestPeer::open(addr).await;
    let mut p2 = TestPeer::open(addr).await;
    assert_eq!(
        p1.connect("g", a1, None, Some(physical(7801))).await,
        command::CONNECT_OK
    );
    assert_eq!(
        p2.connect("g", a2, None, Some(physical(7802))).await,
        command::CONNECT_OK
    );

    assert_eq!(p1.disconnect("g", a1).await, command::DISCONNECT_OK);

    let members = p2.members("g").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].addr, Some(a2));

    server.stop().await;
}

#[tokio::test]
async fn member_without_name_or_physical_still_listed() {
    let (server, addr) = start_server(test_config()).await;

    let logical = LogicalAddr::random();
    let mut peer = TestPeer::open(addr).await;
    assert_eq!(peer.connect("g", logical, None, None).await, command::CONNECT_OK);

    let members = peer.members("g").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].addr, Some(logical));
    assert_eq!(members[0].logical_name, None);
    assert_eq!(members[0].physical, None);

    server.stop().await;
}
