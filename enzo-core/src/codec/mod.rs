//! Stream delimiter for byte-stream transports.
//!
//! Message-oriented transports hand over one frame per message. A raw
//! byte stream (TCP) has no boundaries, so `FrameCodec` cuts it into
//! whole frames using the header's payload length. The frames are
//! yielded undecoded; `Frame::decode` runs later in the driver.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::EnzoError;
use crate::frame::{HEADER_SIZE, MAX_PAYLOAD_SIZE};

#[derive(Debug, Default)]
pub struct FrameCodec {}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = EnzoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let mut length = [0u8; 4];
        length.copy_from_slice(&src[12..HEADER_SIZE]);
        let payload_len = u32::from_le_bytes(length) as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(EnzoError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        Ok(Some(src.split_to(total).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = EnzoError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::id::MessageId;

    #[test]
    fn splits_concatenated_frames() {
        let first = Frame::post("a", &b"one"[..]).encode().unwrap();
        let second = Frame::pong(MessageId::random()).encode().unwrap();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&first);
        buf.extend_from_slice(&second);

        let mut codec = FrameCodec::default();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), second);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn waits_for_partial_frame() {
        let frame = Frame::post("key", vec![7u8; 64]).encode().unwrap();
        let mut codec = FrameCodec::default();

        let mut buf = BytesMut::from(&frame[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[10..40]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&frame[40..]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(Frame::decode(&decoded).unwrap().key(), Some("key"));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_oversized_declaration() {
        let mut header = Frame::ping().encode().unwrap().to_vec();
        header[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut buf = BytesMut::from(&header[..]);
        assert!(matches!(
            FrameCodec::default().decode(&mut buf),
            Err(EnzoError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn encoder_passes_bytes_through() {
        let frame = Frame::ping().encode().unwrap();
        let mut dst = BytesMut::new();
        FrameCodec::default().encode(frame.clone(), &mut dst).unwrap();
        assert_eq!(&dst[..], &frame[..]);
    }
}
