//! Compact stream codec for the relay wire protocol.
//!
//! Integers travel as one length byte L in 0..=8 followed by L little-endian
//! bytes of the two's-complement value; a lone zero byte encodes the value 0.
//! This is NOT the zig-zag varint used by protobuf. Existing peers depend on
//! the length-prefixed form, so bit-exactness matters more than byte count.
//!
//! Strings come in two forms: the presence-flagged modified-UTF-8 form
//! (byte-compatible with `java.io.DataOutput::writeUTF`), and the raw ascii
//! form with a signed 16-bit length prefix where -1 denotes null.

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Faults raised while encoding or decoding wire data.
///
/// A decode fault means the stream is out of frame sync; the session that
/// produced it must be torn down.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("compact length byte {0} out of range")]
    BadLength(u8),

    #[error("presence flag byte 0x{0:02x} is neither 0 nor 1")]
    BadPresenceFlag(u8),

    #[error("string of {0} bytes exceeds its 16-bit length prefix")]
    StringTooLong(usize),

    #[error("malformed modified-UTF-8 data")]
    MalformedUtf,

    #[error("unknown logical address type tag 0x{0:02x}")]
    UnknownAddrType(u8),

    #[error("physical address with unsupported octet length {0}")]
    BadPhysicalAddr(u8),

    #[error("payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("negative payload length {0}")]
    NegativePayloadLength(i32),

    #[error("sequence pair has hr ({hr}) < hd ({hd})")]
    InvalidSequence { hd: u64, hr: u64 },
}

// ── Compact ints ─────────────────────────────────────────────────────────────

/// Smallest L >= 1 such that the top 8-L bytes of `num` are zero.
/// Negative values always need the full width (arithmetic shift).
fn bytes_required_for_long(num: i64) -> u8 {
    if num >> 56 != 0 {
        return 8;
    }
    if num >> 48 != 0 {
        return 7;
    }
    if num >> 40 != 0 {
        return 6;
    }
    if num >> 32 != 0 {
        return 5;
    }
    if num >> 24 != 0 {
        return 4;
    }
    if num >> 16 != 0 {
        return 3;
    }
    if num >> 8 != 0 {
        return 2;
    }
    1
}

fn bytes_required_for_int(num: i32) -> u8 {
    if num >> 24 != 0 {
        return 4;
    }
    if num >> 16 != 0 {
        return 3;
    }
    if num >> 8 != 0 {
        return 2;
    }
    1
}

/// Appends a compact signed 32-bit value.
pub fn write_int(num: i32, buf: &mut impl BufMut) {
    if num == 0 {
        buf.put_u8(0);
        return;
    }
    let len = bytes_required_for_int(num);
    buf.put_u8(len);
    for i in 0..len {
        buf.put_u8((num >> (i * 8)) as u8);
    }
}

/// Reads a compact signed 32-bit value. Any length in 0..=8 is accepted;
/// bytes beyond the low four are truncated away.
pub async fn read_int<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32, CodecError> {
    let len = r.read_u8().await?;
    if len == 0 {
        return Ok(0);
    }
    if len > 8 {
        return Err(CodecError::BadLength(len));
    }
    let mut bytes = [0u8; 8];
    r.read_exact(&mut bytes[..len as usize]).await?;
    Ok(make_long(&bytes[..len as usize]) as i32)
}

/// Appends a compact signed 64-bit value.
pub fn write_long(num: i64, buf: &mut impl BufMut) {
    if num == 0 {
        buf.put_u8(0);
        return;
    }
    let len = bytes_required_for_long(num);
    buf.put_u8(len);
    for i in 0..len {
        buf.put_u8((num >> (i * 8)) as u8);
    }
}

/// Reads a compact signed 64-bit value.
pub async fn read_long<R: AsyncRead + Unpin>(r: &mut R) -> Result<i64, CodecError> {
    let len = r.read_u8().await?;
    if len == 0 {
        return Ok(0);
    }
    if len > 8 {
        return Err(CodecError::BadLength(len));
    }
    let mut bytes = [0u8; 8];
    r.read_exact(&mut bytes[..len as usize]).await?;
    Ok(make_long(&bytes[..len as usize]))
}

fn make_long(bytes: &[u8]) -> i64 {
    let mut num = 0i64;
    for (i, b) in bytes.iter().enumerate() {
        num |= (*b as i64) << (i * 8);
    }
    num
}

// ── Long sequences ───────────────────────────────────────────────────────────

/// Appends a pair of non-negative longs `hd <= hr` as one nibble-packed
/// length byte followed by the little-endian blobs of `hd` and `hr - hd`.
/// A lone zero byte encodes `(0, 0)`.
pub fn write_long_sequence(hd: u64, hr: u64, buf: &mut impl BufMut) -> Result<(), CodecError> {
    if hr < hd {
        return Err(CodecError::InvalidSequence { hd, hr });
    }
    if hd == 0 && hr == 0 {
        buf.put_u8(0);
        return Ok(());
    }
    let delta = hr - hd;
    let len_hd = bytes_required_for_long(hd as i64);
    let len_delta = bytes_required_for_long(delta as i64);
    buf.put_u8((len_hd << 4) | len_delta);
    for i in 0..len_hd {
        buf.put_u8((hd >> (i * 8)) as u8);
    }
    for i in 0..len_delta {
        buf.put_u8((delta >> (i * 8)) as u8);
    }
    Ok(())
}

/// Reads a nibble-packed long pair, returning `(hd, hd + delta)`.
pub async fn read_long_sequence<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<(u64, u64), CodecError> {
    let len = r.read_u8().await?;
    if len == 0 {
        return Ok((0, 0));
    }
    let len_hd = (len >> 4) as usize;
    let len_delta = (len & 0x0f) as usize;
    if len_hd > 8 || len_delta > 8 {
        return Err(CodecError::BadLength(len));
    }
    let mut bytes = [0u8; 16];
    r.read_exact(&mut bytes[..len_hd + len_delta]).await?;
    let hd = make_long(&bytes[..len_hd]) as u64;
    let delta = make_long(&bytes[len_hd..len_hd + len_delta]) as u64;
    Ok((hd, hd.wrapping_add(delta)))
}

// ── UTF strings ──────────────────────────────────────────────────────────────

/// Appends a nullable string: presence byte, then modified UTF-8 with a
/// two-byte big-endian length prefix.
pub fn write_string(s: Option<&str>, buf: &mut impl BufMut) -> Result<(), CodecError> {
    match s {
        None => {
            buf.put_u8(0);
            Ok(())
        }
        Some(s) => {
            buf.put_u8(1);
            write_utf(s, buf)
        }
    }
}

/// Reads a nullable presence-flagged modified-UTF-8 string.
pub async fn read_string<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<String>, CodecError> {
    match r.read_u8().await? {
        0 => Ok(None),
        1 => Ok(Some(read_utf(r).await?)),
        other => Err(CodecError::BadPresenceFlag(other)),
    }
}

fn write_utf(s: &str, buf: &mut impl BufMut) -> Result<(), CodecError> {
    let encoded = encode_modified_utf8(s);
    if encoded.len() > u16::MAX as usize {
        return Err(CodecError::StringTooLong(encoded.len()));
    }
    buf.put_u16(encoded.len() as u16);
    buf.put_slice(&encoded);
    Ok(())
}

async fn read_utf<R: AsyncRead + Unpin>(r: &mut R) -> Result<String, CodecError> {
    let len = r.read_u16().await? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).await?;
    decode_modified_utf8(&bytes)
}

/// Modified UTF-8: NUL becomes C0 80, supplementary characters become
/// CESU-8 surrogate pairs. Encoding runs over UTF-16 code units so both
/// fall out of the 2- and 3-byte arms.
fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String, CodecError> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x00..=0x7f => {
                units.push(b as u16);
                i += 1;
            }
            0xc0..=0xdf => {
                let b2 = *bytes.get(i + 1).ok_or(CodecError::MalformedUtf)?;
                if b2 & 0xc0 != 0x80 {
                    return Err(CodecError::MalformedUtf);
                }
                units.push(((b as u16 & 0x1f) << 6) | (b2 as u16 & 0x3f));
                i += 2;
            }
            0xe0..=0xef => {
                let b2 = *bytes.get(i + 1).ok_or(CodecError::MalformedUtf)?;
                let b3 = *bytes.get(i + 2).ok_or(CodecError::MalformedUtf)?;
                if b2 & 0xc0 != 0x80 || b3 & 0xc0 != 0x80 {
                    return Err(CodecError::MalformedUtf);
                }
                units.push(((b as u16 & 0x0f) << 12) | ((b2 as u16 & 0x3f) << 6) | (b3 as u16 & 0x3f));
                i += 3;
            }
            _ => return Err(CodecError::MalformedUtf),
        }
    }
    String::from_utf16(&units).map_err(|_| CodecError::MalformedUtf)
}

// ── Ascii strings ────────────────────────────────────────────────────────────

/// Appends a nullable raw string: signed 16-bit big-endian byte length
/// (-1 = null) followed by the bytes.
pub fn write_ascii_string(s: Option<&str>, buf: &mut impl BufMut) -> Result<(), CodecError> {
    match s {
        None => {
            buf.put_i16(-1);
            Ok(())
        }
        Some(s) => {
            if s.len() > i16::MAX as usize {
                return Err(CodecError::StringTooLong(s.len()));
            }
            buf.put_i16(s.len() as i16);
            buf.put_slice(s.as_bytes());
            Ok(())
        }
    }
}

/// Reads a nullable length-prefixed raw string.
pub async fn read_ascii_string<R: AsyncRead + Unpin>(
    r: &mut R,
) -> Result<Option<String>, CodecError> {
    let len = r.read_i16().await?;
    if len < 0 {
        return Ok(None);
    }
    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes).await?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| CodecError::MalformedUtf)
}
