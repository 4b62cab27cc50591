//! Wire frames.
//!
//! ```text
//! message_type:    u8        (1)
//! long_running:    u8        (1)   0x00 / 0x01
//! message_id:      [u8; 10]  (10)
//! payload_length:  u32 LE    (4)   bytes after the header
//! ── only when an envelope is present ──
//! key_length:      u32 LE    (4)
//! key:             utf-8     (key_length)
//! data_length:     u32 LE    (4)
//! data:            [u8]      (data_length, may be 0)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::EnzoError;
use crate::id::{ID_LENGTH, MessageId};
use crate::message::MessageType;

/// Size of the fixed frame header.
pub const HEADER_SIZE: usize = 16;

/// Largest payload a frame may declare.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

// ── Envelope ─────────────────────────────────────────────────────

/// The key/data pair carried by application frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key: String,
    pub data: Bytes,
}

impl Envelope {
    pub fn new(key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            data: data.into(),
        }
    }

    fn encoded_len(&self) -> usize {
        4 + self.key.len() + 4 + self.data.len()
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// One complete protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_type: MessageType,
    pub long_running: bool,
    pub id: MessageId,
    pub envelope: Option<Envelope>,
}

impl Frame {
    pub fn new(
        message_type: MessageType,
        long_running: bool,
        id: MessageId,
        envelope: Option<Envelope>,
    ) -> Self {
        Self {
            message_type,
            long_running,
            id,
            envelope,
        }
    }

    /// A liveness probe with a fresh id.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping, false, MessageId::random(), None)
    }

    /// The answer to the ping carrying `id`.
    pub fn pong(id: MessageId) -> Self {
        Self::new(MessageType::Pong, false, id, None)
    }

    pub fn close() -> Self {
        Self::new(MessageType::Close, false, MessageId::default(), None)
    }

    /// An application request with a fresh id.
    pub fn post(key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(
            MessageType::Post,
            false,
            MessageId::random(),
            Some(Envelope::new(key, data)),
        )
    }

    /// The reply to the request carrying `id`.
    pub fn back(id: MessageId, key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::new(MessageType::Back, false, id, Some(Envelope::new(key, data)))
    }

    pub fn with_long_running(mut self, long_running: bool) -> Self {
        self.long_running = long_running;
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.envelope.as_ref().map(|e| e.key.as_str())
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.envelope.as_ref().map(|e| &e.data)
    }

    pub fn token(&self) -> String {
        self.id.token()
    }

    /// Number of bytes following the header.
    pub fn payload_len(&self) -> usize {
        self.envelope.as_ref().map_or(0, Envelope::encoded_len)
    }

    // ── Encoding ─────────────────────────────────────────────────

    pub fn encode(&self) -> Result<Bytes, EnzoError> {
        let payload_len = self.payload_len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(EnzoError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload_len);
        buf.put_u8(self.message_type as u8);
        buf.put_u8(self.long_running as u8);
        buf.put_slice(self.id.as_bytes());
        buf.put_u32_le(payload_len as u32);

        if let Some(envelope) = &self.envelope {
            buf.put_u32_le(envelope.key.len() as u32);
            buf.put_slice(envelope.key.as_bytes());
            buf.put_u32_le(envelope.data.len() as u32);
            buf.put_slice(&envelope.data);
        }
        Ok(buf.freeze())
    }

    /// Parse one frame from a complete transport message.
    ///
    /// Any structural violation is returned as an error; nothing is
    /// partially interpreted.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnzoError> {
        if bytes.len() < HEADER_SIZE {
            return Err(EnzoError::FrameTooShort {
                len: bytes.len(),
                min: HEADER_SIZE,
            });
        }

        let mut buf = bytes;
        let message_type = MessageType::try_from(buf.get_u8())?;
        let long_running = buf.get_u8() != 0;
        let mut id = [0u8; ID_LENGTH];
        buf.copy_to_slice(&mut id);
        let declared = buf.get_u32_le() as usize;

        if declared > MAX_PAYLOAD_SIZE {
            return Err(EnzoError::FrameTooLarge {
                size: declared,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if declared != buf.remaining() {
            return Err(EnzoError::InvalidPayloadLength {
                declared,
                actual: buf.remaining(),
            });
        }

        let envelope = if declared > 0 {
            Some(decode_envelope(buf)?)
        } else {
            None
        };

        Ok(Self {
            message_type,
            long_running,
            id: MessageId::new(id),
            envelope,
        })
    }
}

fn decode_envelope(mut buf: &[u8]) -> Result<Envelope, EnzoError> {
    let key = take_prefixed(&mut buf, "key length exceeds payload")?;
    let key = std::str::from_utf8(key)?.to_owned();
    let data = Bytes::copy_from_slice(take_prefixed(&mut buf, "data length exceeds payload")?);

    if buf.has_remaining() {
        return Err(EnzoError::MalformedFrame("trailing bytes after data"));
    }
    Ok(Envelope { key, data })
}

fn take_prefixed<'a>(buf: &mut &'a [u8], overrun: &'static str) -> Result<&'a [u8], EnzoError> {
    if buf.remaining() < 4 {
        return Err(EnzoError::MalformedFrame("truncated length prefix"));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(EnzoError::MalformedFrame(overrun));
    }
    let rest: &'a [u8] = *buf;
    let (head, tail) = rest.split_at(len);
    *buf = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(
            MessageType::Post,
            true,
            MessageId::new(*b"0123456789"),
            Some(Envelope::new("echo", &b"hi"[..])),
        )
    }

    #[test]
    fn header_layout() {
        let bytes = sample().encode().unwrap();
        assert_eq!(bytes[0], MessageType::Post as u8);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(&bytes[2..12], b"0123456789");
        let payload_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        assert_eq!(payload_len as usize, 4 + 4 + 4 + 2);
        assert_eq!(bytes.len(), HEADER_SIZE + payload_len as usize);
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(&bytes[20..24], b"echo");
        assert_eq!(&bytes[24..28], &2u32.to_le_bytes());
        assert_eq!(&bytes[28..], b"hi");
    }

    #[test]
    fn roundtrip_application_frames() {
        let frames = [
            sample(),
            Frame::post("", Bytes::new()),
            Frame::back(MessageId::random(), "sessions|get", vec![1, 2, 3]),
            Frame::new(
                MessageType::Plugin,
                false,
                MessageId::random(),
                Some(Envelope::new("ключ", vec![0u8; 1024])),
            ),
        ];
        for frame in frames {
            let bytes = frame.encode().unwrap();
            assert_eq!(Frame::decode(&bytes).unwrap(), frame);
        }
    }

    #[test]
    fn ping_and_pong_are_header_only() {
        let ping = Frame::ping();
        let bytes = ping.encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);

        let pong = Frame::pong(ping.id);
        let decoded = Frame::decode(&pong.encode().unwrap()).unwrap();
        assert_eq!(decoded.message_type, MessageType::Pong);
        assert_eq!(decoded.id, ping.id);
        assert!(decoded.envelope.is_none());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = Frame::decode(&[0x0C; 15]).unwrap_err();
        assert!(matches!(err, EnzoError::FrameTooShort { len: 15, .. }));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[0] = 0x42;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(EnzoError::UnknownVariant { value: 0x42, .. })
        ));
    }

    #[test]
    fn declared_length_mismatch_is_rejected() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes.push(0);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(EnzoError::InvalidPayloadLength { .. })
        ));

        let mut bytes = sample().encode().unwrap().to_vec();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(EnzoError::InvalidPayloadLength { .. })
        ));
    }

    #[test]
    fn overrunning_key_length_is_rejected() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[16..20].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(
            Frame::decode(&bytes),
            Err(EnzoError::MalformedFrame(_))
        ));
    }

    #[test]
    fn invalid_utf8_key_is_rejected() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[20] = 0xFF;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(EnzoError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn oversized_declaration_is_rejected_before_length_check() {
        let mut raw = Frame::ping().encode().unwrap().to_vec();
        raw[12..16].copy_from_slice(&((MAX_PAYLOAD_SIZE + 1) as u32).to_le_bytes());
        assert!(matches!(
            Frame::decode(&raw),
            Err(EnzoError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn nonzero_long_running_byte_reads_true() {
        let mut bytes = Frame::ping().encode().unwrap().to_vec();
        bytes[1] = 0x07;
        assert!(Frame::decode(&bytes).unwrap().long_running);
    }
}
