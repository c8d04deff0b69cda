//! waypoint-core — wire protocol shared by the relay server and its peers.
//!
//! Everything a peer needs to speak to the rendezvous server lives here:
//! the compact stream codec ([`bits`]), logical/physical addresses
//! ([`address`]), and the single record envelope ([`record`]). The crate is
//! pure protocol — no sockets, no server state. Decoding works against any
//! `AsyncRead`; encoding appends to a `BytesMut`.

pub mod address;
pub mod bits;
pub mod record;

pub use address::{LogicalAddr, PhysicalAddr};
pub use bits::CodecError;
pub use record::{command, GossipRecord, PingData};
