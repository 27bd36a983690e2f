//! Tokio codec for envelope framing.
//!
//! Envelopes travel as newline-delimited JSON: one UTF-8 JSON object per
//! line, terminated by `\n` (a preceding `\r` is tolerated). The codec
//! implements [`Decoder`] and [`Encoder`] so both relay endpoints can wrap
//! their TCP streams in `tokio_util::codec::Framed`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use cardlink_protocol::{Envelope, EnvelopeCodec, EnvelopeKind};
//! use futures::{SinkExt, StreamExt};
//!
//! # async fn example() -> cardlink_core::Result<()> {
//! let stream = TcpStream::connect("127.0.0.1:7171").await?;
//! let mut framed = Framed::new(stream, EnvelopeCodec::new());
//!
//! framed.send(Envelope::event(EnvelopeKind::Heartbeat)).await?;
//!
//! if let Some(Ok(envelope)) = framed.next().await {
//!     println!("received {}", envelope.kind);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error handling
//!
//! A line that is not valid JSON decodes to `Error::InvalidEnvelope`. The
//! offending line has already been consumed from the buffer, so the
//! connection loop can log the error and keep reading — a malformed
//! envelope never tears down the stream. Oversized frames are rejected
//! before parsing to bound memory use on hostile input.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::Envelope;
use cardlink_core::{Error, Result};

/// Default maximum frame size in bytes (64 KB).
///
/// Generous for every legitimate envelope (the largest carries one card's
/// worth of hex payload, ~2 KB) while bounding memory on malformed or
/// hostile streams.
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Newline-delimited JSON codec for [`Envelope`] streams.
#[derive(Debug)]
pub struct EnvelopeCodec {
    /// Maximum allowed frame size in bytes.
    max_frame_size: usize,
}

impl EnvelopeCodec {
    /// Create a codec with the default maximum frame size.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom maximum frame size.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the current maximum frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = Error;

    /// Extract the next complete envelope from the byte stream.
    ///
    /// Returns `Ok(None)` until a full line is buffered. Blank lines are
    /// skipped. A complete line that fails to parse consumes the line and
    /// returns `Error::InvalidEnvelope`.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                // No complete line yet; refuse to buffer without bound.
                if src.len() > self.max_frame_size {
                    return Err(Error::FrameTooLarge {
                        size: src.len(),
                        max_size: self.max_frame_size,
                    });
                }
                return Ok(None);
            };

            if pos > self.max_frame_size {
                return Err(Error::FrameTooLarge {
                    size: pos,
                    max_size: self.max_frame_size,
                });
            }

            let frame = src.split_to(pos + 1);
            let mut line = &frame[..pos];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            if line.is_empty() {
                continue;
            }

            return serde_json::from_slice(line)
                .map(Some)
                .map_err(|e| Error::InvalidEnvelope(e.to_string()));
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = Error;

    /// Serialize an envelope and append it to the stream as one line.
    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)?;
        if json.len() > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size: json.len(),
                max_size: self.max_frame_size,
            });
        }

        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use serde_json::json;

    fn decode_all(codec: &mut EnvelopeCodec, buf: &mut BytesMut) -> Vec<Result<Envelope>> {
        let mut out = Vec::new();
        loop {
            match codec.decode(buf) {
                Ok(Some(envelope)) => out.push(Ok(envelope)),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    #[test]
    fn test_decode_complete_envelope() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"CARD_DETECTED\",\"payload\":{\"uid\":\"04AB\"}}\n"[..]);

        let envelope = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::CardDetected);
        assert_eq!(envelope.payload, Some(json!({ "uid": "04AB" })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"{\"type\":\"HEART"[..]);

        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"BEAT\"}\n");
        let envelope = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Heartbeat);
    }

    #[test]
    fn test_decode_multiple_envelopes_in_buffer() {
        let mut codec = EnvelopeCodec::new();
        let mut buf =
            BytesMut::from(&b"{\"type\":\"CARD_DETECTED\"}\n{\"type\":\"CARD_REMOVED\"}\n"[..]);

        let results = decode_all(&mut codec, &mut buf);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().kind, EnvelopeKind::CardDetected);
        assert_eq!(results[1].as_ref().unwrap().kind, EnvelopeKind::CardRemoved);
    }

    #[test]
    fn test_decode_skips_blank_lines_and_crlf() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"\n\r\n{\"type\":\"STATUS\"}\r\n"[..]);

        let envelope = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Status);
    }

    #[test]
    fn test_decode_malformed_line_consumes_and_errors() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::from(&b"not json at all\n{\"type\":\"HEARTBEAT\"}\n"[..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::InvalidEnvelope(_)));

        // The stream recovers on the next envelope.
        let envelope = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::Heartbeat);
    }

    #[test]
    fn test_decode_unbounded_line_is_rejected() {
        let mut codec = EnvelopeCodec::with_max_frame_size(32);
        let mut buf = BytesMut::from(vec![b'x'; 64].as_slice());

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { .. }));
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Envelope::event(EnvelopeKind::Heartbeat), &mut buf)
            .unwrap();

        assert_eq!(buf[buf.len() - 1], b'\n');
        let line = &buf[..buf.len() - 1];
        let value: serde_json::Value = serde_json::from_slice(line).unwrap();
        assert_eq!(value["type"], "HEARTBEAT");
    }

    #[test]
    fn test_encode_oversized_envelope_is_rejected() {
        let mut codec = EnvelopeCodec::with_max_frame_size(16);
        let mut buf = BytesMut::new();

        let mut envelope = Envelope::event(EnvelopeKind::WriteCard);
        envelope.data = Some(json!({ "blob": "A".repeat(64) }));

        let err = codec.encode(envelope, &mut buf).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_through_codec() {
        let mut codec = EnvelopeCodec::new();
        let mut buf = BytesMut::new();

        let original = crate::EnvelopeBuilder::new(EnvelopeKind::ReadResult)
            .request_id("READ_CARD-1700000000000-a1b2c3d4")
            .payload(json!({ "payload": "7B7D" }))
            .success(true)
            .build();

        codec.encode(original.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.kind, original.kind);
        assert_eq!(decoded.request_id, original.request_id);
        assert_eq!(decoded.payload, original.payload);
        assert_eq!(decoded.success, original.success);
    }
}
