//! Request and response bodies of the sessions operations.
//!
//! All integers are little-endian.
//!
//! ```text
//! get      key_len:u32 key
//! set      ttl:i32 key_len:u32 key data_len:u32 tag:u8 value   (data_len = value + 1)
//! ttl      ttl:i32 key_len:u32 key
//! sizes    (empty)
//! clean    (empty)
//!
//! response status:u8 body_len:u32 body     status 0x01 ok, 0x02 error
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::SessionsError;

pub const STATUS_OK: u8 = 0x01;
pub const STATUS_ERROR: u8 = 0x02;

/// Type marker stored in front of every value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTag {
    Bool = 0x01,
    Int32 = 0x02,
    String = 0x03,
}

impl TryFrom<u8> for ValueTag {
    type Error = SessionsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ValueTag::Bool),
            0x02 => Ok(ValueTag::Int32),
            0x03 => Ok(ValueTag::String),
            _ => Err(SessionsError::Malformed("unknown value tag")),
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────

fn put_key(buf: &mut BytesMut, key: &str) {
    buf.put_u32_le(key.len() as u32);
    buf.put_slice(key.as_bytes());
}

pub fn encode_get(key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + key.len());
    put_key(&mut buf, key);
    buf.freeze()
}

pub fn encode_set(key: &str, ttl: i32, tag: ValueTag, value: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + 4 + key.len() + 4 + 1 + value.len());
    buf.put_i32_le(ttl);
    put_key(&mut buf, key);
    buf.put_u32_le(value.len() as u32 + 1);
    buf.put_u8(tag as u8);
    buf.put_slice(value);
    buf.freeze()
}

pub fn encode_ttl(key: &str, ttl: i32) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + 4 + key.len());
    buf.put_i32_le(ttl);
    put_key(&mut buf, key);
    buf.freeze()
}

// ── Responses ────────────────────────────────────────────────────

/// Split a response into its body, or the server's error message.
pub fn decode_response(raw: &[u8]) -> Result<Bytes, SessionsError> {
    if raw.is_empty() {
        return Err(SessionsError::Empty);
    }
    if raw.len() < 5 {
        return Err(SessionsError::Malformed("truncated response header"));
    }

    let mut buf = raw;
    let status = buf.get_u8();
    let body_len = buf.get_u32_le() as usize;
    if buf.remaining() < body_len {
        return Err(SessionsError::Malformed("body length exceeds response"));
    }
    let body = &buf[..body_len];

    match status {
        STATUS_OK => Ok(Bytes::copy_from_slice(body)),
        STATUS_ERROR => Err(SessionsError::Remote(
            String::from_utf8_lossy(body).into_owned(),
        )),
        _ => Err(SessionsError::Malformed("unknown response status")),
    }
}

/// Check the tag of a stored value and return what follows it.
pub fn expect_tag(value: &[u8], expected: ValueTag) -> Result<&[u8], SessionsError> {
    let (&found, rest) = value
        .split_first()
        .ok_or(SessionsError::Malformed("value without tag"))?;
    if found != expected as u8 {
        return Err(SessionsError::TypeMismatch { expected, found });
    }
    Ok(rest)
}

pub fn decode_i32(bytes: &[u8]) -> Result<i32, SessionsError> {
    let raw: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(SessionsError::Malformed("int32 value too short"))?;
    Ok(i32::from_le_bytes(raw))
}
