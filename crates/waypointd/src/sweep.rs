//! Idle-session eviction.
//!
//! A single periodic task walks the routing table, collects sessions whose
//! last activity is older than the configured expiry into a victim list
//! outside the iteration, then closes them through the normal teardown.
//! Empty groups encountered on the way are pruned.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::Session;
use crate::state::ServerState;

/// Spawns the sweeper. Caller guarantees `expiry_ms > 0`.
pub fn spawn(state: Arc<ServerState>, cancel: CancellationToken) -> JoinHandle<()> {
    let period = Duration::from_millis(state.config.expiry_ms);
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => sweep(&state).await,
            }
        }
        tracing::debug!("sweeper stopped");
    })
}

pub(crate) async fn sweep(state: &ServerState) {
    let expiry_ms = state.config.expiry_ms;
    let mut victims: Vec<Arc<Session>> = Vec::new();
    for group in state.routing.group_names() {
        let members = state.routing.sessions_in_group(&group);
        if members.is_empty() {
            state.routing.remove_group_if_empty(&group);
            continue;
        }
        for (_, session) in members {
            if session.idle_ms(state) > expiry_ms
                && !victims.iter().any(|v| v.id() == session.id())
            {
                victims.push(session);
            }
        }
    }
    if victims.is_empty() {
        return;
    }
    tracing::debug!(count = victims.len(), expiry_ms, "sweeping expired sessions");
    for victim in victims {
        victim.close(state).await;
    }
}
