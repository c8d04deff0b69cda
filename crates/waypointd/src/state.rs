//! Shared server state threaded through sessions, the relay, the sweeper,
//! and the failure hooks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;

use waypoint_core::LogicalAddr;

use crate::config::Config;
use crate::mapping::{AddressMap, NameRegistry};
use crate::routing::RoutingTable;
use crate::session::Session;
use crate::tear::{SuspectNotifier, TearListener};

pub struct ServerState {
    pub config: Config,
    pub routing: RoutingTable,
    pub mappings: AddressMap,
    pub names: NameRegistry,
    /// Every live session, registered or not. Also the teardown worklist
    /// for `stop`.
    pub sessions: DashMap<u64, Arc<Session>>,
    /// Monotonic anchor for activity timestamps and uptime.
    pub epoch: Instant,
    next_session_id: AtomicU64,
    /// Copy-on-write: reads snapshot the list, writes append under the lock.
    tear_listeners: RwLock<Vec<Arc<dyn TearListener>>>,
}

impl ServerState {
    /// Fresh state with the default suspect-notification hook registered.
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            routing: RoutingTable::new(),
            mappings: AddressMap::new(),
            names: NameRegistry::new(),
            sessions: DashMap::new(),
            epoch: Instant::now(),
            next_session_id: AtomicU64::new(1),
            tear_listeners: RwLock::new(vec![Arc::new(SuspectNotifier)]),
        })
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Listeners fire in registration order.
    pub fn add_tear_listener(&self, listener: Arc<dyn TearListener>) {
        self.tear_listeners.write().push(listener);
    }

    /// Invoked by a session whose read loop died abnormally, before its
    /// teardown runs, so listeners still see its registrations.
    pub async fn notify_tear(&self, session: &Session, cause: &anyhow::Error) {
        let listeners: Vec<Arc<dyn TearListener>> = self.tear_listeners.read().clone();
        for listener in listeners {
            listener.connection_torn(self, session, cause).await;
        }
    }

    /// Removes everything keyed by `addr`: the routing entries (one group or
    /// all), the physical mapping, and the name binding. A no-op when
    /// nothing matches: a session that never completed a CONNECT has
    /// nothing here.
    pub fn remove_entry(&self, group: Option<&str>, addr: &LogicalAddr) {
        self.routing.remove(group, addr);
        self.mappings.remove(addr);
        self.names.unbind(addr);
    }

    pub fn sessions_snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn clear_indices(&self) {
        self.routing.clear();
        self.mappings.clear();
        self.names.clear();
        self.sessions.clear();
    }
}
