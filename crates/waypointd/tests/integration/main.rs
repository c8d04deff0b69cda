//! End-to-end tests driving a real relay server over loopback TCP with the
//! waypoint-core codec — no mocks, real sockets.

mod connect;
mod directory;
mod relaying;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

pub use waypoint_core::{command, GossipRecord, LogicalAddr, PhysicalAddr, PingData};
pub use waypointd::{Config, RelayServer};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Config for tests: OS-assigned loopback port, no expiry unless asked.
pub fn test_config() -> Config {
    Config {
        expiry_ms: 0,
        ..Config::default()
    }
}

pub async fn start_server(mut config: Config) -> (RelayServer, SocketAddr) {
    config.port = 0;
    config.bind_addr = Some([127, 0, 0, 1].into());
    let server = RelayServer::new(config);
    let addr = server.start().await.expect("server should start");
    (server, addr)
}

pub fn physical(port: u16) -> PhysicalAddr {
    PhysicalAddr::from(SocketAddr::from(([127, 0, 0, 1], port)))
}

/// A scripted peer speaking the wire protocol over a loopback socket.
pub struct TestPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestPeer {
    pub async fn open(server: SocketAddr) -> Self {
        let stream = TcpStream::connect(server).await.expect("connect to server");
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    pub async fn send(&mut self, record: &GossipRecord) {
        let mut buf = BytesMut::new();
        record.write_to(&mut buf).expect("encode record");
        self.writer.write_all(&buf).await.expect("write record");
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write raw bytes");
    }

    pub async fn recv_status(&mut self) -> u8 {
        tokio::time::timeout(RECV_TIMEOUT, self.reader.read_u8())
            .await
            .expect("timed out waiting for status byte")
            .expect("read status byte")
    }

    pub async fn recv_record(&mut self) -> GossipRecord {
        tokio::time::timeout(RECV_TIMEOUT, GossipRecord::read_from(&mut self.reader))
            .await
            .expect("timed out waiting for record")
            .expect("read record")
    }

    /// GOSSIP_GET reply body: u16 count, then that many PingData.
    pub async fn recv_members(&mut self) -> Vec<PingData> {
        let count = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_u16())
            .await
            .expect("timed out waiting for member count")
            .expect("read member count");
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let member = tokio::time::timeout(RECV_TIMEOUT, PingData::read_from(&mut self.reader))
                .await
                .expect("timed out reading member entry")
                .expect("read member entry");
            members.push(member);
        }
        members
    }

    /// Full CONNECT exchange; returns the status byte.
    pub async fn connect(
        &mut self,
        group: &str,
        addr: LogicalAddr,
        name: Option<&str>,
        physical: Option<PhysicalAddr>,
    ) -> u8 {
        self.send(&GossipRecord {
            group: Some(group.into()),
            addr: Some(addr),
            logical_name: name.map(Into::into),
            physical,
            ..GossipRecord::new(command::CONNECT)
        })
        .await;
        self.recv_status().await
    }

    pub async fn disconnect(&mut self, group: &str, addr: LogicalAddr) -> u8 {
        self.send(&GossipRecord {
            group: Some(group.into()),
            addr: Some(addr),
            ..GossipRecord::new(command::DISCONNECT)
        })
        .await;
        self.recv_status().await
    }

    pub async fn message(&mut self, group: &str, dest: Option<LogicalAddr>, payload: &[u8]) {
        self.send(&GossipRecord {
            group: Some(group.into()),
            addr: dest,
            payload: Some(bytes::Bytes::copy_from_slice(payload)),
            ..GossipRecord::new(command::MESSAGE)
        })
        .await;
    }

    pub async fn members(&mut self, group: &str) -> Vec<PingData> {
        self.send(&GossipRecord {
            group: Some(group.into()),
            ..GossipRecord::new(command::GOSSIP_GET)
        })
        .await;
        self.recv_members().await
    }

    /// Asserts the server has closed (or is closing) this peer's connection.
    pub async fn expect_eof(&mut self) {
        let res = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_u8())
            .await
            .expect("timed out waiting for the server to close the connection");
        assert!(res.is_err(), "expected EOF, got byte {:?}", res);
    }

    /// Asserts the server sends nothing for `dur` and keeps the socket open.
    pub async fn expect_silence(&mut self, dur: Duration) {
        let res = tokio::time::timeout(dur, self.reader.read_u8()).await;
        assert!(res.is_err(), "expected no data from the server, got {:?}", res);
    }
}
