use crate::*;

#[tokio::test]
async fn unicast_reaches_only_the_destination() {
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

    p1.message("g", Some(a2), b"hello").await;

    let delivered = p2.recv_record().await;
    assert_eq!(delivered.command, command::MESSAGE);
    assert_eq!(delivered.addr, Some(a2));
    assert_eq!(delivered.payload.as_deref(), Some(b"hello".as_ref()));

    p1.expect_silence(std::time::Duration::from_millis(300)).await;

    server.stop().await;
}

#[tokio::test]
async fn multicast_reaches_the_group_except_the_sender() {
    let (server, addr) = start_server(test_config()).await;

    let a1 = LogicalAddr::random();
    let a2 = LogicalAddr::random();
    let a3 = LogicalAddr::random();
    let mut p1 = TestPeer::open(addr).await;
    let mut p2 = TestPeer::open(addr).await;
    let mut p3 = TestPeer::open(addr).await;
    for (peer, logical, port) in [
        (&mut p1, a1, 7801),
        (&mut p2, a2, 7802),
        (&mut p3, a3, 7803),
    ] {
        assert_eq!(
            peer.connect("g", logical, None, Some(physical(port))).await,
            command::CONNECT_OK
        );
    }

    p1.message("g", None, b"bcast").await;

    for peer in [&mut p2, &mut p3] {
        let delivered = peer.recv_record().await;
        assert_eq!(delivered.command, command::MESSAGE);
        assert_eq!(delivered.addr, None);
        assert_eq!(delivered.payload.as_deref(), Some(b"bcast".as_ref()));
    }
    p1.expect_silence(std::time::Duration::from_millis(300)).await;

    server.stop().await;
}

#[tokio::test]
async fn empty_payload_is_dropped_silently() {
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

    p1.message("g", Some(a2), b"").await;
    p1.send(&GossipRecord {
        group: Some("g".into()),
        addr: Some(a2),
        ..GossipRecord::new(command::MESSAGE)
    })
    .await;

    p2.expect_silence(std::time::Duration::from_millis(300)).await;

    // The sender's session is still healthy.
    assert_eq!(p1.members("g").await.len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn unknown_destination_is_dropped_silently() {
    let (server, addr) = start_server(test_config()).await;

    let a1 = LogicalAddr::random();
    let mut p1 = TestPeer::open(addr).await;
    assert_eq!(
        p1.connect("g", a1, None, Some(physical(7801))).await,
        command::CONNECT_OK
    );

    p1.message("g", Some(LogicalAddr::random()), b"void").await;
    p1.expect_silence(std::time::Duration::from_millis(300)).await;
    assert_eq!(p1.members("g").await.len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn relayed_records_do_not_interleave() {
    let (server, addr) = start_server(test_config()).await;

    let dest = LogicalAddr::random();
    let mut receiver = TestPeer::open(addr).await;
    assert_eq!(
        receiver.connect("g", dest, None, Some(physical(7800))).await,
        command::CONNECT_OK
    );

    // Two senders hammer the same destination concurrently; every record
    // must decode cleanly and carry one of the two payloads intact.
    let mut senders = Vec::new();
    for tag in [b'a', b'b'] {
        let mut peer = TestPeer::open(addr).await;
        let logical = LogicalAddr::random();
        assert_eq!(
            peer.connect("g", logical, None, Some(physical(7900 + tag as u16))).await,
            command::CONNECT_OK
        );
        senders.push(tokio::spawn(async move {
            let payload = vec![tag; 4096];
            for _ in 0..50 {
                peer.message("g", Some(dest), &payload).await;
            }
            peer
        }));
    }

    for _ in 0..100 {
        let record = receiver.recv_record().await;
        assert_eq!(record.command, command::MESSAGE);
        let payload = record.payload.expect("relayed record has a payload");
        assert_eq!(payload.len(), 4096);
        assert!(
            payload.iter().all(|b| *b == payload[0]),
            "payload bytes interleaved across writers"
        );
    }

    for sender in senders {
        sender.await.expect("sender task");
    }
    server.stop().await;
}
