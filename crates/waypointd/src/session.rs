//! Per-connection session: owns the socket halves, runs the read loop,
//! dispatches commands, and tears itself down exactly once.
//!
//! A session is spawned per accepted socket. The read half is owned by the
//! session task; the write half sits behind a mutex that doubles as the
//! per-stream write monitor, so a relayed payload can never interleave with
//! a suspect notification on the same stream.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;

use waypoint_core::{command, GossipRecord, LogicalAddr, PingData};

use crate::relay;
use crate::state::ServerState;

pub struct Session {
    id: u64,
    peer: SocketAddr,
    /// Flipped false → true when the read loop starts and true → false by
    /// `close`. Once false, the session accepts no further writes.
    active: AtomicBool,
    cancel: CancellationToken,
    /// The per-stream write monitor. Taken by `close` on teardown.
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    /// Millis since the server epoch at last received record.
    last_activity_ms: AtomicU64,
    /// Logical addresses this session registered, in CONNECT order.
    logical_addrs: Mutex<Vec<LogicalAddr>>,
    /// Every group this session has named in any record.
    known_groups: Mutex<HashSet<String>>,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr, writer: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer,
            active: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            writer: tokio::sync::Mutex::new(Some(writer)),
            last_activity_ms: AtomicU64::new(0),
            logical_addrs: Mutex::new(Vec::new()),
            known_groups: Mutex::new(HashSet::new()),
        })
    }

    /// A session with no transport, for exercising the indices in tests.
    #[cfg(test)]
    pub(crate) fn detached(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer: SocketAddr::from(([0, 0, 0, 0], 0)),
            active: AtomicBool::new(true),
            cancel: CancellationToken::new(),
            writer: tokio::sync::Mutex::new(None),
            last_activity_ms: AtomicU64::new(0),
            logical_addrs: Mutex::new(Vec::new()),
            known_groups: Mutex::new(HashSet::new()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn logical_addrs(&self) -> Vec<LogicalAddr> {
        self.logical_addrs.lock().clone()
    }

    pub fn known_groups(&self) -> Vec<String> {
        self.known_groups.lock().iter().cloned().collect()
    }

    pub fn touch(&self, state: &ServerState) {
        self.last_activity_ms
            .store(state.epoch.elapsed().as_millis() as u64, Ordering::Release);
    }

    /// Millis since the last received record.
    pub fn idle_ms(&self, state: &ServerState) -> u64 {
        (state.epoch.elapsed().as_millis() as u64)
            .saturating_sub(self.last_activity_ms.load(Ordering::Acquire))
    }

    /// Drives the session until EOF, a framing or transport fault, a CLOSE
    /// command, or an external close. Abnormal exits raise the tear
    /// notification before teardown so the failure hook still sees the
    /// session's groups and addresses registered.
    pub async fn run(self: Arc<Self>, read: OwnedReadHalf, state: Arc<ServerState>) {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.touch(&state);
        let mut reader = BufReader::new(read);
        if let Err(cause) = Self::read_loop(&self, &mut reader, &state).await {
            if self.is_active() {
                tracing::debug!(session = self.id, peer = %self.peer, error = %cause, "session torn");
                state.notify_tear(&self, &cause).await;
            }
        }
        self.close(&state).await;
    }

    async fn read_loop(
        this: &Arc<Self>,
        reader: &mut BufReader<OwnedReadHalf>,
        state: &Arc<ServerState>,
    ) -> anyhow::Result<()> {
        let timeout_ms = state.config.sock_read_timeout_ms;
        while this.is_active() {
            let command = tokio::select! {
                _ = this.cancel.cancelled() => break,
                res = read_command(reader, timeout_ms) => match res? {
                    Some(command) => command,
                    None => continue, // read timeout re-arms the loop
                },
            };
            let record = tokio::select! {
                _ = this.cancel.cancelled() => break,
                res = GossipRecord::read_after_command(command, reader) => res?,
            };

            if let Some(group) = &record.group {
                this.known_groups.lock().insert(group.clone());
            }
            this.touch(state);
            tracing::trace!(
                session = this.id,
                command = %command::name(record.command),
                "received record"
            );

            match record.command {
                command::CONNECT => {
                    if let Err(e) = Self::handle_connect(this, &record, state).await {
                        tracing::warn!(session = this.id, error = %e, "connection handshake failed");
                        break;
                    }
                }
                command::DISCONNECT => match record.addr {
                    Some(addr) => {
                        state.remove_entry(record.group.as_deref(), &addr);
                        this.send_status(command::DISCONNECT_OK).await;
                    }
                    None => this.send_status(command::OP_FAIL).await,
                },
                command::MESSAGE => match &record.payload {
                    Some(payload) if !payload.is_empty() => {
                        relay::route(
                            state,
                            this.id,
                            record.addr,
                            record.group.as_deref(),
                            payload.clone(),
                        )
                        .await;
                    }
                    _ => tracing::warn!(session = this.id, "dropping message with empty payload"),
                },
                command::GOSSIP_GET => {
                    this.answer_members_query(record.group.as_deref(), state)
                        .await?;
                }
                command::PING => {}
                command::CLOSE => this.close(state).await,
                other => {
                    tracing::warn!(session = this.id, command = other, "ignoring unknown command")
                }
            }
        }
        Ok(())
    }

    /// CONNECT handshake. State that needs unwinding is only recorded after
    /// every fallible step, and a failure rolls back, answers OP_FAIL, and
    /// propagates so the read loop tears the session down.
    async fn handle_connect(
        this: &Arc<Self>,
        record: &GossipRecord,
        state: &Arc<ServerState>,
    ) -> anyhow::Result<()> {
        match Self::register(this, record, state).await {
            Ok(addr) => {
                this.send_status(command::CONNECT_OK).await;
                tracing::debug!(
                    session = this.id,
                    %addr,
                    group = record.group.as_deref().unwrap_or(""),
                    "connection handshake completed"
                );
                Ok(())
            }
            Err(e) => {
                if let Some(addr) = record.addr {
                    state.remove_entry(record.group.as_deref(), &addr);
                }
                this.send_status(command::OP_FAIL).await;
                Err(e)
            }
        }
    }

    async fn register(
        this: &Arc<Self>,
        record: &GossipRecord,
        state: &Arc<ServerState>,
    ) -> anyhow::Result<LogicalAddr> {
        let addr = record.addr.context("CONNECT carries no logical address")?;
        let group = record.group.as_deref();

        this.supersede_stale_session(&addr, group, state).await;

        if let Some(name) = &record.logical_name {
            state.names.bind(addr, name.clone());
        }
        if let Some(group) = group {
            state.routing.add(group, addr, Arc::clone(this));
        }
        if let Some(physical) = record.physical {
            state.mappings.insert(addr, physical);
        }
        // Recorded last: a failed handshake has nothing here to unwind.
        this.logical_addrs.lock().push(addr);
        Ok(addr)
    }

    /// A peer reconnecting after a silent partition re-announces an address
    /// the server still maps. The prior session holding it is force-closed
    /// before the new registration lands, so the routing table never carries
    /// two sessions for one address.
    async fn supersede_stale_session(
        &self,
        addr: &LogicalAddr,
        group: Option<&str>,
        state: &ServerState,
    ) {
        if !state.mappings.contains(addr) {
            return;
        }
        let prior = match group {
            Some(group) => state.routing.find(group, addr),
            None => state.routing.find_any(addr),
        };
        match prior {
            Some(old) if old.id() != self.id => {
                tracing::debug!(
                    %addr,
                    old_session = old.id(),
                    "closing stale session for reconnecting peer"
                );
                old.close(state).await;
            }
            _ => tracing::debug!(%addr, "no prior session to supersede"),
        }
    }

    /// GOSSIP_GET reply: u16 member count, then one PingData per member.
    /// An unknown (or absent) group answers with count 0.
    async fn answer_members_query(
        &self,
        group: Option<&str>,
        state: &ServerState,
    ) -> anyhow::Result<()> {
        let mut members = Vec::new();
        if let Some(group) = group {
            for addr in state.routing.snapshot_members(group) {
                members.push(PingData {
                    addr: Some(addr),
                    is_server: true,
                    logical_name: state.names.get(&addr),
                    physical: state.mappings.get(&addr),
                });
            }
        }
        let mut buf = BytesMut::new();
        buf.put_u16(members.len() as u16);
        for member in &members {
            member.write_to(&mut buf)?;
        }
        self.send_bytes(buf.freeze()).await?;
        tracing::debug!(
            session = self.id,
            group = group.unwrap_or(""),
            count = members.len(),
            "answered directory query"
        );
        Ok(())
    }

    /// Writes one encoded record under the stream's write monitor.
    pub async fn send_record(&self, record: &GossipRecord) -> anyhow::Result<()> {
        let mut buf = BytesMut::new();
        record.write_to(&mut buf)?;
        self.send_bytes(buf.freeze()).await?;
        Ok(())
    }

    /// Writes a pre-encoded frame under the stream's write monitor.
    pub async fn send_bytes(&self, frame: Bytes) -> io::Result<()> {
        if !self.is_active() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "session closed"));
        }
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) => {
                w.write_all(&frame).await?;
                w.flush().await
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "session has no transport",
            )),
        }
    }

    /// Status-byte replies are best-effort; a dead peer learns nothing from
    /// an error it cannot receive.
    async fn send_status(&self, status: u8) {
        if let Err(e) = self.send_bytes(Bytes::copy_from_slice(&[status])).await {
            tracing::debug!(session = self.id, error = %e, "failed to send status byte");
        }
    }

    /// Idempotent teardown: the first caller wins the compare-and-set,
    /// unblocks the read loop, shuts the transport, and removes every index
    /// entry this session contributed. Entries that were never registered
    /// remove as no-ops.
    pub async fn close(&self, state: &ServerState) {
        if self
            .active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        tracing::debug!(session = self.id, peer = %self.peer, "closing session");
        self.cancel.cancel();
        // Index entries go first: once the peer observes the transport
        // closing, nothing may still resolve to this session.
        let addrs: Vec<LogicalAddr> = std::mem::take(&mut *self.logical_addrs.lock());
        for addr in &addrs {
            state.remove_entry(None, addr);
        }
        state.sessions.remove(&self.id);
        // Awaiting the monitor is bounded: every write path releases it
        // after a single frame. Taking the half guarantees the shutdown
        // runs exactly once, here.
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

/// Reads the next command byte. Only this byte is subject to the read
/// timeout: a timeout between records is a keepalive gap, reported as
/// `None` so the caller re-arms the read.
async fn read_command(
    reader: &mut BufReader<OwnedReadHalf>,
    timeout_ms: u64,
) -> io::Result<Option<u8>> {
    if timeout_ms > 0 {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), reader.read_u8()).await {
            Ok(res) => res.map(Some),
            Err(_elapsed) => Ok(None),
        }
    } else {
        reader.read_u8().await.map(Some)
    }
}
