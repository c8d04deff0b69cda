//! Payload routing: unicast to one member or fan-out to a whole group.
//!
//! The relay never surfaces delivery failures to the sender. A unicast
//! target that fails its write is evicted and closed; a fan-out member that
//! fails is logged and skipped so the rest of the group still hears.

use bytes::{Bytes, BytesMut};

use waypoint_core::{command, GossipRecord, LogicalAddr};

use crate::state::ServerState;

/// Routes one relayed payload. `dest` present = unicast; absent = fan-out
/// to every member of `group` except the sender itself.
pub async fn route(
    state: &ServerState,
    sender: u64,
    dest: Option<LogicalAddr>,
    group: Option<&str>,
    payload: Bytes,
) {
    match dest {
        Some(dest) => unicast(state, dest, group, payload).await,
        None => match group {
            Some(group) => multicast(state, sender, group, payload).await,
            None => tracing::error!("message names neither a destination nor a group"),
        },
    }
}

async fn unicast(state: &ServerState, dest: LogicalAddr, group: Option<&str>, payload: Bytes) {
    let Some(group) = group else {
        tracing::trace!(%dest, "unicast without a group, dropping");
        return;
    };
    let Some(target) = state.routing.find(group, &dest) else {
        tracing::trace!(%dest, group, "destination not in routing table, dropping");
        return;
    };
    let record = GossipRecord {
        addr: Some(dest),
        payload: Some(payload),
        ..GossipRecord::new(command::MESSAGE)
    };
    if let Err(e) = target.send_record(&record).await {
        tracing::error!(%dest, group, error = %e, "forwarding failed, evicting destination");
        state.remove_entry(Some(group), &dest);
        target.close(state).await;
    }
}

async fn multicast(state: &ServerState, sender: u64, group: &str, payload: Bytes) {
    let members = state.routing.sessions_in_group(group);
    if members.is_empty() {
        tracing::warn!(group, "no members for group");
        return;
    }
    let record = GossipRecord {
        payload: Some(payload),
        ..GossipRecord::new(command::MESSAGE)
    };
    let mut buf = BytesMut::new();
    if let Err(e) = record.write_to(&mut buf) {
        tracing::error!(group, error = %e, "failed to encode relay record");
        return;
    }
    let frame = buf.freeze();
    for (addr, member) in members {
        if member.id() == sender {
            continue;
        }
        if let Err(e) = member.send_bytes(frame.clone()).await {
            tracing::warn!(%addr, error = %e, "cannot relay to member");
        }
    }
}
