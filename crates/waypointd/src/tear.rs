//! Failure-notification hooks, invoked when a session tears abnormally.

use async_trait::async_trait;

use waypoint_core::{command, GossipRecord};

use crate::session::Session;
use crate::state::ServerState;

/// One-method capability fired on abnormal session termination. Implementors
/// run before the dead session's teardown, so its groups and logical
/// addresses are still registered.
#[async_trait]
pub trait TearListener: Send + Sync {
    async fn connection_torn(&self, state: &ServerState, session: &Session, cause: &anyhow::Error);
}

/// Default hook: tells every surviving member of the dead session's groups
/// which logical addresses to suspect. Peers feed this into their own
/// failure detection.
pub struct SuspectNotifier;

#[async_trait]
impl TearListener for SuspectNotifier {
    async fn connection_torn(&self, state: &ServerState, session: &Session, cause: &anyhow::Error) {
        let addrs = session.logical_addrs();
        if addrs.is_empty() {
            return;
        }
        tracing::debug!(session = session.id(), error = %cause, "notifying groups of suspect peer");
        for group in session.known_groups() {
            for (_, member) in state.routing.sessions_in_group(&group) {
                if member.id() == session.id() {
                    continue;
                }
                for addr in &addrs {
                    let suspect = GossipRecord {
                        addr: Some(*addr),
                        ..GossipRecord::new(command::SUSPECT)
                    };
                    if let Err(e) = member.send_record(&suspect).await {
                        // The member may itself be mid-teardown.
                        tracing::debug!(member = member.id(), error = %e, "suspect notification failed");
                    }
                }
            }
        }
    }
}
