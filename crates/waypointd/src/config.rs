//! Daemon configuration. Populated from CLI flags by the binary; tests
//! build one directly and override what they need.

use std::net::IpAddr;

/// Runtime knobs for the relay server.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the server listens on. 0 = OS-assigned (used by tests).
    pub port: u16,
    /// Address to bind. None = all interfaces.
    pub bind_addr: Option<IpAddr>,
    /// Max queue size of backlogged connections.
    pub backlog: u32,
    /// Idle-session expiry in ms. 0 = sessions never expire.
    pub expiry_ms: u64,
    /// SO_LINGER for accepted sockets, in ms. 0 = do not set.
    pub linger_ms: u64,
    /// Per-record read timeout in ms. 0 = block forever. A timeout only
    /// re-arms the read; it never terminates the session.
    pub sock_read_timeout_ms: u64,
    /// Bound on concurrently served sessions. Accepts beyond this are
    /// rejected and closed rather than queued.
    pub max_conns: usize,
    /// HTTP status endpoint port. 0 = disabled.
    pub status_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 12001,
            bind_addr: None,
            backlog: 1000,
            expiry_ms: 60_000,
            linger_ms: 2000,
            sock_read_timeout_ms: 0,
            max_conns: 1024,
            status_port: 0,
        }
    }
}
