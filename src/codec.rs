//! Sentinel-delimited text framing.
//!
//! The wire protocol terminates every frame with a single fixed control byte
//! rather than a line terminator. [`SentinelCodec`] implements the
//! `tokio_util` [`Decoder`]/[`Encoder`] pair for that format, decoding frames
//! as text in the configured [`Encoding`] and guarding against unbounded
//! buffering when the peer never sends a sentinel.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::Encoding;

/// End-of-frame control byte.
pub const SENTINEL: u8 = 0x04;

/// Default cap on a single frame's payload.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4 * 1024 * 1024;

/// Errors raised while framing or deframing the byte stream.
///
/// Any variant other than [`Io`](Self::Io) indicates the stream can no longer
/// be trusted to be at a frame boundary; the owning channel must be
/// discarded.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Unterminated input exceeded the configured frame cap.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Bytes buffered without a sentinel.
        size: usize,
        /// Configured cap.
        max: usize,
    },
    /// Frame payload was not valid text in the configured encoding.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8(#[source] std::str::Utf8Error),
    /// Outbound payload contained the sentinel byte.
    #[error("payload contains the frame sentinel")]
    SentinelInPayload,
    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Codec splitting the stream on [`SENTINEL`] bytes.
#[derive(Clone, Debug)]
pub struct SentinelCodec {
    encoding: Encoding,
    max_frame_length: usize,
    /// Scan resume point: bytes before this offset are known sentinel-free.
    next_index: usize,
}

impl SentinelCodec {
    /// Create a codec for the given encoding and frame cap.
    #[must_use]
    pub const fn new(encoding: Encoding, max_frame_length: usize) -> Self {
        Self {
            encoding,
            max_frame_length,
            next_index: 0,
        }
    }

    /// Configured cap on a single frame.
    #[must_use]
    pub const fn max_frame_length(&self) -> usize { self.max_frame_length }
}

impl Default for SentinelCodec {
    fn default() -> Self { Self::new(Encoding::Utf8, DEFAULT_MAX_FRAME_LENGTH) }
}

impl Decoder for SentinelCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, CodecError> {
        if let Some(offset) = src[self.next_index..]
            .iter()
            .position(|&byte| byte == SENTINEL)
        {
            let frame = src.split_to(self.next_index + offset);
            src.advance(1);
            self.next_index = 0;
            return self.encoding.decode(&frame).map(Some);
        }
        if src.len() > self.max_frame_length {
            return Err(CodecError::OversizedFrame {
                size: src.len(),
                max: self.max_frame_length,
            });
        }
        self.next_index = src.len();
        Ok(None)
    }
}

impl<T: AsRef<str>> Encoder<T> for SentinelCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: T, dst: &mut BytesMut) -> Result<(), CodecError> {
        let frame = frame.as_ref();
        if frame.as_bytes().contains(&SENTINEL) {
            return Err(CodecError::SentinelInPayload);
        }
        dst.reserve(frame.len() + 1);
        dst.put_slice(frame.as_bytes());
        dst.put_u8(SENTINEL);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut SentinelCodec, src: &mut BytesMut) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(src).expect("decode frame") {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn splits_frames_on_sentinel() {
        let mut codec = SentinelCodec::default();
        let mut src = BytesMut::from(&b"ok\x04results {\"num\":1}\x04"[..]);
        assert_eq!(decode_all(&mut codec, &mut src), ["ok", "results {\"num\":1}"]);
        assert!(src.is_empty());
    }

    #[test]
    fn buffers_partial_frames_across_reads() {
        let mut codec = SentinelCodec::default();
        let mut src = BytesMut::from(&b"resu"[..]);
        assert!(codec.decode(&mut src).expect("partial decode").is_none());
        src.extend_from_slice(b"lts {}\x04");
        assert_eq!(
            codec.decode(&mut src).expect("completed decode").as_deref(),
            Some("results {}"),
        );
    }

    #[test]
    fn rejects_unterminated_input_past_the_cap() {
        let mut codec = SentinelCodec::new(Encoding::Utf8, 8);
        let mut src = BytesMut::from(&b"0123456789"[..]);
        let err = codec.decode(&mut src).expect_err("oversized input");
        assert!(matches!(
            err,
            CodecError::OversizedFrame { size: 10, max: 8 }
        ));
    }

    #[test]
    fn rejects_non_utf8_payload() {
        let mut codec = SentinelCodec::default();
        let mut src = BytesMut::from(&b"\xff\xfe\x04"[..]);
        let err = codec.decode(&mut src).expect_err("invalid utf-8");
        assert!(matches!(err, CodecError::InvalidUtf8(_)));
    }

    #[test]
    fn encode_appends_the_sentinel() {
        let mut codec = SentinelCodec::default();
        let mut dst = BytesMut::new();
        codec.encode("dbstats", &mut dst).expect("encode frame");
        assert_eq!(&dst[..], b"dbstats\x04");
    }

    #[test]
    fn encode_rejects_embedded_sentinel() {
        let mut codec = SentinelCodec::default();
        let mut dst = BytesMut::new();
        let err = codec
            .encode("get\x04vn", &mut dst)
            .expect_err("embedded sentinel");
        assert!(matches!(err, CodecError::SentinelInPayload));
        assert!(dst.is_empty());
    }
}
