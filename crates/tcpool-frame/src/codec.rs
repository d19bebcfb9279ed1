//! Length-prefixed frame codec.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FrameError;

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Default upper bound on a single frame payload (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Codec turning a byte stream into length-prefixed frames and back.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    /// Create a codec with the default maximum frame length.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Create a codec that rejects payloads longer than `max_frame_len`.
    #[must_use]
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    /// Maximum accepted payload length.
    #[must_use]
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let len = decode_header(&src[..HEADER_LEN])?;
        if len > self.max_frame_len {
            return Err(FrameError::FrameTooLarge {
                size: len,
                max: self.max_frame_len,
            });
        }

        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        tracing::trace!(len, "decoded frame");
        Ok(Some(payload))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_len || item.len() > u32::MAX as usize {
            return Err(FrameError::FrameTooLarge {
                size: item.len(),
                max: self.max_frame_len,
            });
        }

        dst.reserve(HEADER_LEN + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

/// Encode `payload` as a single frame.
///
/// Useful for callers writing directly to a pooled connection rather than
/// through a [`FrameStream`](crate::FrameStream).
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    let mut dst = BytesMut::with_capacity(HEADER_LEN + payload.len());
    FrameCodec::new().encode(Bytes::copy_from_slice(payload), &mut dst)?;
    Ok(dst.freeze())
}

/// Read the payload length from a frame header.
pub fn decode_header(header: &[u8]) -> Result<usize, FrameError> {
    let bytes: [u8; HEADER_LEN] = header
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or(FrameError::IncompleteHeader {
            needed: HEADER_LEN.saturating_sub(header.len()),
        })?;
    Ok(u32::from_be_bytes(bytes) as usize)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_waits_for_full_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 5, b'h', b'e'][..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_frames_in_one_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(b"ab").unwrap());
        buf.extend_from_slice(&encode_frame(b"").unwrap());

        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"ab");
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut codec = FrameCodec::with_max_frame_len(4);
        let mut buf = BytesMut::from(&[0u8, 0, 0, 9][..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 9, max: 4 }));
    }

    #[test]
    fn test_decode_eof_with_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 3, 1][..]);

        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn test_decode_header_short_slice() {
        let err = decode_header(&[0, 1]).unwrap_err();
        assert!(matches!(err, FrameError::IncompleteHeader { needed: 2 }));
        assert_eq!(decode_header(&[0, 0, 1, 0]).unwrap(), 256);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let mut codec = FrameCodec::with_max_frame_len(2);
        let mut dst = BytesMut::new();
        let err = codec
            .encode(Bytes::from_static(b"abc"), &mut dst)
            .unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 3, max: 2 }));
        assert!(dst.is_empty());
    }

    proptest! {
        #[test]
        fn prop_decode_survives_arbitrary_split(
            payload in proptest::collection::vec(any::<u8>(), 0..512),
            split in 0usize..520,
        ) {
            let wire = encode_frame(&payload).unwrap();
            let split = split.min(wire.len());
            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::from(&wire[..split]);

            let early = codec.decode(&mut buf).unwrap();
            if split < wire.len() {
                prop_assert!(early.is_none());
                buf.extend_from_slice(&wire[split..]);
                let frame = codec.decode(&mut buf).unwrap().unwrap();
                prop_assert_eq!(&frame[..], &payload[..]);
            } else {
                prop_assert_eq!(&early.unwrap()[..], &payload[..]);
            }
        }
    }
}
