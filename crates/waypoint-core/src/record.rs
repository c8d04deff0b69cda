//! The single on-the-wire envelope and the directory reply element.
//!
//! Every exchange with the server is a stream of [`GossipRecord`]s: one
//! command byte, then each optional field gated by its own presence flag,
//! then the payload. Records are self-delimiting — there is no outer frame
//! and no multiplexing beyond the command dispatch.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::address::{
    read_addr, read_physical, write_addr, write_physical, LogicalAddr, PhysicalAddr,
};
use crate::bits::{self, CodecError};

/// Upper bound on a single relayed payload. Larger data must be split by the
/// sender; a length beyond this is treated as frame desync, not a request.
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Command bytes. Changing any value after peers ship is a wire break.
pub mod command {
    pub const CONNECT: u8 = 1;
    pub const DISCONNECT: u8 = 2;
    pub const GOSSIP_GET: u8 = 4;
    pub const MESSAGE: u8 = 10;
    pub const SUSPECT: u8 = 11;
    pub const PING: u8 = 12;
    pub const CLOSE: u8 = 13;
    pub const CONNECT_OK: u8 = 14;
    pub const OP_FAIL: u8 = 15;
    pub const DISCONNECT_OK: u8 = 16;

    /// Human-readable command name for logs.
    pub fn name(cmd: u8) -> String {
        match cmd {
            CONNECT => "CONNECT".into(),
            DISCONNECT => "DISCONNECT".into(),
            GOSSIP_GET => "GOSSIP_GET".into(),
            MESSAGE => "MESSAGE".into(),
            SUSPECT => "SUSPECT".into(),
            PING => "PING".into(),
            CLOSE => "CLOSE".into(),
            CONNECT_OK => "CONNECT_OK".into(),
            OP_FAIL => "OP_FAIL".into(),
            DISCONNECT_OK => "DISCONNECT_OK".into(),
            other => format!("unknown({other})"),
        }
    }
}

/// One protocol record.
///
/// Wire order is exactly: command, group (ascii, -1 = null), logical address
/// (presence-gated), logical name (ascii), physical address (presence-gated),
/// payload (presence flag + compact-int byte count + bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipRecord {
    pub command: u8,
    pub group: Option<String>,
    pub addr: Option<LogicalAddr>,
    pub logical_name: Option<String>,
    pub physical: Option<PhysicalAddr>,
    pub payload: Option<Bytes>,
}

impl GossipRecord {
    /// A record of the given command with every optional field absent.
    pub fn new(command: u8) -> Self {
        Self {
            command,
            group: None,
            addr: None,
            logical_name: None,
            physical: None,
            payload: None,
        }
    }

    /// Appends the full wire form of this record.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.put_u8(self.command);
        bits::write_ascii_string(self.group.as_deref(), buf)?;
        write_addr(self.addr.as_ref(), buf);
        bits::write_ascii_string(self.logical_name.as_deref(), buf)?;
        write_physical(self.physical.as_ref(), buf);
        match &self.payload {
            None => buf.put_u8(0),
            Some(payload) => {
                if payload.len() > MAX_PAYLOAD {
                    return Err(CodecError::PayloadTooLarge(payload.len()));
                }
                buf.put_u8(1);
                bits::write_int(payload.len() as i32, buf);
                buf.put_slice(payload);
            }
        }
        Ok(())
    }

    /// Reads one record, command byte included.
    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, CodecError> {
        let command = r.read_u8().await?;
        Self::read_after_command(command, r).await
    }

    /// Reads the body of a record whose command byte was already consumed.
    /// The server's read loop applies its read timeout only to the command
    /// byte, so the body is read here untimed.
    pub async fn read_after_command<R: AsyncRead + Unpin>(
        command: u8,
        r: &mut R,
    ) -> Result<Self, CodecError> {
        let group = bits::read_ascii_string(r).await?;
        let addr = read_addr(r).await?;
        let logical_name = bits::read_ascii_string(r).await?;
        let physical = read_physical(r).await?;
        let payload = match r.read_u8().await? {
            0 => None,
            1 => {
                let len = bits::read_int(r).await?;
                if len < 0 {
                    return Err(CodecError::NegativePayloadLength(len));
                }
                let len = len as usize;
                if len > MAX_PAYLOAD {
                    return Err(CodecError::PayloadTooLarge(len));
                }
                let mut bytes = vec![0u8; len];
                r.read_exact(&mut bytes).await?;
                Some(Bytes::from(bytes))
            }
            other => return Err(CodecError::BadPresenceFlag(other)),
        };
        Ok(Self {
            command,
            group,
            addr,
            logical_name,
            physical,
            payload,
        })
    }
}

/// One member entry in a directory (GOSSIP_GET) reply.
///
/// The server always answers with `is_server = true`; the flag exists so
/// peers can merge these entries with responses gathered from each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingData {
    pub addr: Option<LogicalAddr>,
    pub is_server: bool,
    pub logical_name: Option<String>,
    pub physical: Option<PhysicalAddr>,
}

impl PingData {
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        write_addr(self.addr.as_ref(), buf);
        buf.put_u8(self.is_server as u8);
        bits::write_string(self.logical_name.as_deref(), buf)?;
        write_physical(self.physical.as_ref(), buf);
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, CodecError> {
        let addr = read_addr(r).await?;
        let is_server = r.read_u8().await? != 0;
        let logical_name = bits::read_string(r).await?;
        let physical = read_physical(r).await?;
        Ok(Self {
            addr,
            is_server,
            logical_name,
            physical,
        })
    }
}
