//! Logical and physical peer addresses.
//!
//! A [`LogicalAddr`] is the peer's stable 128-bit identity — minted by the
//! peer, opaque to the server, stable across reconnects if the peer wants it
//! to be. A [`PhysicalAddr`] is the transport endpoint other peers can dial
//! directly; the server stores it verbatim and never connects to it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::bits::CodecError;

/// Type tag for the 128-bit uuid form of a logical address. The tag leaves
/// room for other identity encodings without breaking the wire format.
const ADDR_TYPE_UUID: u8 = 1;

/// Opaque 128-bit peer identity. Equality and hashing by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalAddr([u8; 16]);

impl LogicalAddr {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Mints a fresh random identity. Peers normally do this once and keep
    /// the address across reconnects.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub(crate) fn write_to(&self, buf: &mut impl BufMut) {
        buf.put_u8(ADDR_TYPE_UUID);
        buf.put_slice(&self.0);
    }

    pub(crate) async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, CodecError> {
        let tag = r.read_u8().await?;
        if tag != ADDR_TYPE_UUID {
            return Err(CodecError::UnknownAddrType(tag));
        }
        let mut bytes = [0u8; 16];
        r.read_exact(&mut bytes).await?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for LogicalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for LogicalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalAddr({})", self)
    }
}

/// Appends a presence-gated logical address.
pub fn write_addr(addr: Option<&LogicalAddr>, buf: &mut impl BufMut) {
    match addr {
        None => buf.put_u8(0),
        Some(a) => {
            buf.put_u8(1);
            a.write_to(buf);
        }
    }
}

/// Reads a presence-gated logical address.
pub async fn read_addr<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<LogicalAddr>, CodecError> {
    match r.read_u8().await? {
        0 => Ok(None),
        1 => Ok(Some(LogicalAddr::read_from(r).await?)),
        other => Err(CodecError::BadPresenceFlag(other)),
    }
}

/// Transport endpoint of a peer, opaque to the server. Wire form: one octet
/// count (4 or 16), the raw address octets, then a big-endian port.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalAddr(SocketAddr);

impl PhysicalAddr {
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub(crate) fn write_to(&self, buf: &mut impl BufMut) {
        match self.0.ip() {
            IpAddr::V4(ip) => {
                buf.put_u8(4);
                buf.put_slice(&ip.octets());
            }
            IpAddr::V6(ip) => {
                buf.put_u8(16);
                buf.put_slice(&ip.octets());
            }
        }
        buf.put_u16(self.0.port());
    }

    pub(crate) async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, CodecError> {
        let ip = match r.read_u8().await? {
            4 => {
                let mut octets = [0u8; 4];
                r.read_exact(&mut octets).await?;
                IpAddr::V4(Ipv4Addr::from(octets))
            }
            16 => {
                let mut octets = [0u8; 16];
                r.read_exact(&mut octets).await?;
                IpAddr::V6(Ipv6Addr::from(octets))
            }
            other => return Err(CodecError::BadPhysicalAddr(other)),
        };
        let port = r.read_u16().await?;
        Ok(Self(SocketAddr::new(ip, port)))
    }
}

impl From<SocketAddr> for PhysicalAddr {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl fmt::Display for PhysicalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for PhysicalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalAddr({})", self.0)
    }
}

/// Appends a presence-gated physical address.
pub fn write_physical(addr: Option<&PhysicalAddr>, buf: &mut impl BufMut) {
    match addr {
        None => buf.put_u8(0),
        Some(a) => {
            buf.put_u8(1);
            a.write_to(buf);
        }
    }
}

/// Reads a presence-gated physical address.
pub async fn read_physical<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Option<PhysicalAddr>, CodecError> {
    match r.read_u8().await? {
        0 => Ok(None),
        1 => Ok(Some(PhysicalAddr::read_from(r).await?)),
        other => Err(CodecError::BadPresenceFlag(other)),
    }
}
