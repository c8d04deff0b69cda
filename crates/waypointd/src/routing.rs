//! Two-level concurrent routing index: group name → logical address → session.
//!
//! Inner member maps are concurrent; lookups and fan-out snapshots never
//! block each other. Structural changes to the outer map (creating a group,
//! deleting an emptied group) serialize on one mutex so a removal observing
//! an empty inner map cannot race an `add` that just created or revived it.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use waypoint_core::LogicalAddr;

use crate::session::Session;

type Members = Arc<DashMap<LogicalAddr, Arc<Session>>>;

#[derive(Default)]
pub struct RoutingTable {
    groups: DashMap<String, Members>,
    /// Serializes group creation with empty-group removal.
    structural: Mutex<()>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `addr → session` under `group`, creating the group if
    /// needed. Held under the structural lock so a concurrent empty-group
    /// removal cannot orphan the freshly created inner map.
    pub fn add(&self, group: &str, addr: LogicalAddr, session: Arc<Session>) {
        let _structure = self.structural.lock();
        let members = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone();
        members.insert(addr, session);
    }

    /// Removes `addr` from one group, or from every group when `group` is
    /// None. A no-op when nothing matches.
    pub fn remove(&self, group: Option<&str>, addr: &LogicalAddr) {
        match group {
            Some(group) => self.remove_from(group, addr),
            None => {
                let names: Vec<String> = self.groups.iter().map(|e| e.key().clone()).collect();
                for group in names {
                    self.remove_from(&group, addr);
                }
            }
        }
    }

    fn remove_from(&self, group: &str, addr: &LogicalAddr) {
        let Some(members) = self.groups.get(group).map(|e| e.value().clone()) else {
            return;
        };
        if members.remove(addr).is_some() {
            tracing::trace!(%addr, group, "removed routing entry");
            if members.is_empty() && self.remove_group_if_empty(group) {
                tracing::trace!(group, "removed empty group");
            }
        }
    }

    /// Check-then-remove under the structural lock: the group key goes away
    /// only if its inner map is still empty at that instant.
    pub(crate) fn remove_group_if_empty(&self, group: &str) -> bool {
        let _structure = self.structural.lock();
        self.groups
            .remove_if(group, |_, members| members.is_empty())
            .is_some()
    }

    /// O(1) lookup of the session registered for `(group, addr)`.
    pub fn find(&self, group: &str, addr: &LogicalAddr) -> Option<Arc<Session>> {
        let members = self.groups.get(group)?;
        let session = members.get(addr)?;
        Some(session.value().clone())
    }

    /// Scans every group for `addr`. Used by the CONNECT duplicate check
    /// when the reconnecting peer names no group.
    pub fn find_any(&self, addr: &LogicalAddr) -> Option<Arc<Session>> {
        for entry in self.groups.iter() {
            if let Some(session) = entry.value().get(addr) {
                return Some(session.value().clone());
            }
        }
        None
    }

    /// Weakly-consistent snapshot of a group's member addresses.
    pub fn snapshot_members(&self, group: &str) -> Vec<LogicalAddr> {
        match self.groups.get(group) {
            Some(members) => members.iter().map(|e| *e.key()).collect(),
            None => Vec::new(),
        }
    }

    /// Weakly-consistent snapshot of a group's members with their sessions,
    /// for fan-out. A peer joining or leaving mid-fan-out may or may not be
    /// included.
    pub fn sessions_in_group(&self, group: &str) -> Vec<(LogicalAddr, Arc<Session>)> {
        match self.groups.get(group) {
            Some(members) => members
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|e| e.key().clone()).collect()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn clear(&self) {
        let _structure = self.structural.lock();
        self.groups.clear();
    }

    /// Group → member list, for the status endpoint.
    pub fn dump(&self) -> Vec<(String, Vec<LogicalAddr>)> {
        self.groups
            .iter()
            .map(|e| (e.key().clone(), e.value().iter().map(|m| *m.key()).collect()))
            .collect()
    }
}
