//! Cross-cutting indices keyed by logical address: the physical-address
//! mapping and the logical-name registry.
//!
//! Both are flat concurrent maps with no compound invariants. The name
//! registry is handed to the server state explicitly rather than living in
//! a process-wide singleton, so tests get a fresh one per server.

use dashmap::DashMap;

use waypoint_core::{LogicalAddr, PhysicalAddr};

/// logical address → transport endpoint. Overwritten on re-registration;
/// removed with the owning session (best-effort, may briefly outlive it).
#[derive(Default)]
pub struct AddressMap {
    entries: DashMap<LogicalAddr, PhysicalAddr>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, addr: LogicalAddr, physical: PhysicalAddr) {
        self.entries.insert(addr, physical);
    }

    pub fn get(&self, addr: &LogicalAddr) -> Option<PhysicalAddr> {
        self.entries.get(addr).map(|e| *e.value())
    }

    pub fn contains(&self, addr: &LogicalAddr) -> bool {
        self.entries.contains_key(addr)
    }

    pub fn remove(&self, addr: &LogicalAddr) {
        self.entries.remove(addr);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Snapshot for the status endpoint.
    pub fn dump(&self) -> Vec<(LogicalAddr, PhysicalAddr)> {
        self.entries.iter().map(|e| (*e.key(), *e.value())).collect()
    }
}

/// logical address → human-readable label, bound on CONNECT.
#[derive(Default)]
pub struct NameRegistry {
    names: DashMap<LogicalAddr, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, addr: LogicalAddr, name: String) {
        self.names.insert(addr, name);
    }

    pub fn get(&self, addr: &LogicalAddr) -> Option<String> {
        self.names.get(addr).map(|e| e.value().clone())
    }

    pub fn unbind(&self, addr: &LogicalAddr) {
        self.names.remove(addr);
    }

    pub fn clear(&self) {
        self.names.clear();
    }
}
