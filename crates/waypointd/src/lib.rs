//! waypointd — rendezvous and relay server for group communication.
//!
//! Peers open long-lived TCP sessions, register their logical addresses
//! under named groups, and use the server as a discovery directory and a
//! message relay. When a session dies, surviving group members are told
//! which logical addresses to suspect.

pub mod config;
pub mod mapping;
pub mod relay;
pub mod routing;
pub mod server;
pub mod session;
pub mod state;
pub mod status;
pub mod sweep;
pub mod tear;

pub use config::Config;
pub use server::RelayServer;
pub use session::Session;
pub use state::ServerState;
pub use tear::{SuspectNotifier, TearListener};
