//! Fixed-size wire frames
//!
//! Every request and every response travels as exactly [`FRAME_SIZE`] bytes.
//! The payload is followed by NUL padding and always leaves room for at
//! least one NUL, so the buffer is also a valid C string.

use crate::error::{PikvError, Result};
use std::borrow::Cow;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of one frame on the wire
pub const FRAME_SIZE: usize = 3072;

/// Largest payload that fits in a frame
pub const MAX_PAYLOAD: usize = FRAME_SIZE - 1;

/// One fixed-size unit of the wire protocol
pub struct Frame {
    buf: Box<[u8; FRAME_SIZE]>,
}

impl Frame {
    fn zeroed() -> Self {
        Self {
            buf: Box::new([0u8; FRAME_SIZE]),
        }
    }

    fn with_payload(payload: &[u8]) -> Self {
        let mut frame = Self::zeroed();
        frame.buf[..payload.len()].copy_from_slice(payload);
        frame
    }

    /// Frame a payload, rejecting anything that would not survive the trip
    pub fn encode(payload: &str) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(PikvError::FrameTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if payload.contains('\0') {
            return Err(PikvError::Protocol(
                "payload must not contain NUL bytes".to_string(),
            ));
        }
        Ok(Self::with_payload(payload.as_bytes()))
    }

    /// Frame a payload, cutting it at the last character boundary that fits.
    /// Text after an embedded NUL would be invisible to the peer and is
    /// dropped as well.
    pub fn encode_truncated(payload: &str) -> Self {
        let payload = payload.split('\0').next().unwrap_or_default();
        let mut end = payload.len().min(MAX_PAYLOAD);
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        Self::with_payload(&payload.as_bytes()[..end])
    }

    /// Payload bytes, up to the first NUL
    pub fn payload(&self) -> &[u8] {
        payload_of(&self.buf[..])
    }

    /// Payload decoded as UTF-8, with invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.payload())
    }

    /// The whole frame including padding
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Read exactly one frame
    pub async fn read_from<R>(reader: &mut R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame = Self::zeroed();
        reader.read_exact(&mut frame.buf[..]).await?;
        Ok(frame)
    }

    /// Write exactly one frame and flush it
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.buf[..]).await?;
        writer.flush().await
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("payload", &self.text())
            .finish()
    }
}

/// Bytes of a raw frame buffer up to the first NUL
pub fn payload_of(raw: &[u8]) -> &[u8] {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    &raw[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pads_to_frame_size() {
        let frame = Frame::encode("GET\nkey").unwrap();
        assert_eq!(frame.as_bytes().len(), FRAME_SIZE);
        assert_eq!(frame.payload(), b"GET\nkey");
        assert!(frame.as_bytes()[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        assert!(Frame::encode(&"x".repeat(MAX_PAYLOAD)).is_ok());

        let err = Frame::encode(&"x".repeat(FRAME_SIZE)).unwrap_err();
        assert!(matches!(
            err,
            PikvError::FrameTooLarge { len: FRAME_SIZE, max: MAX_PAYLOAD }
        ));
    }

    #[test]
    fn test_encode_rejects_nul() {
        assert!(matches!(
            Frame::encode("GET\0k"),
            Err(PikvError::Protocol(_))
        ));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 'ж' is two bytes; MAX_PAYLOAD is odd, so the last one cannot fit whole
        let long = "ж".repeat(FRAME_SIZE);
        let frame = Frame::encode_truncated(&long);
        let text = frame.text();

        assert_eq!(text.len(), MAX_PAYLOAD - 1);
        assert!(text.chars().all(|c| c == 'ж'));
        assert_eq!(frame.as_bytes()[MAX_PAYLOAD], 0);
    }

    #[test]
    fn test_truncation_stops_at_nul() {
        let frame = Frame::encode_truncated("visible\0hidden");
        assert_eq!(frame.text(), "visible");
    }

    #[test]
    fn test_payload_of_unterminated_buffer() {
        assert_eq!(payload_of(b"abc"), b"abc");
        assert_eq!(payload_of(b"ab\0c"), b"ab");
        assert_eq!(payload_of(b""), b"");
    }

    #[tokio::test]
    async fn test_frames_cross_a_stream() {
        let (mut a, mut b) = tokio::io::duplex(FRAME_SIZE * 4);

        Frame::encode("INSERT\nk\nv").unwrap().write_to(&mut a).await.unwrap();
        Frame::encode("GET\nk").unwrap().write_to(&mut a).await.unwrap();

        let first = Frame::read_from(&mut b).await.unwrap();
        let second = Frame::read_from(&mut b).await.unwrap();
        assert_eq!(first.text(), "INSERT\nk\nv");
        assert_eq!(second.text(), "GET\nk");
    }

    #[tokio::test]
    async fn test_short_read_is_unexpected_eof() {
        let (mut a, mut b) = tokio::io::duplex(FRAME_SIZE);
        a.write_all(b"GET\nk").await.unwrap();
        drop(a);

        let err = Frame::read_from(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
