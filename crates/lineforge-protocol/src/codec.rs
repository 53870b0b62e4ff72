//! Newline framing as a `tokio_util` codec.
//!
//! [`LineCodec`] plugs into `FramedRead`/`Framed`, which gives the session
//! a cancel-safe `next()`: if the read future is dropped because the idle
//! timer won the race, any partial line stays in the framed buffer and is
//! picked up by the next iteration. Nothing read from the socket is lost
//! and nothing is attributed to the wrong iteration.
//!
//! ## Framing rules
//!
//! - A line ends at `\n`. A single trailing `\r` is stripped, so CRLF
//!   clients are served the same as LF clients.
//! - A line longer than `max_length` bytes (not counting the `\n` or
//!   `\r\n` terminator) is rejected with [`ProtocolError::LineTooLong`] as soon as enough
//!   bytes have arrived to know it, without buffering the rest.
//! - Bytes that are not valid UTF-8 are replaced with U+FFFD, so decoding
//!   itself never fails.
//! - At end of stream, an unterminated tail is yielded as a final line.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::ProtocolError;

/// Default cap on line length, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1000;

/// Newline-delimited, length-bounded line codec.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Index into the read buffer where the next `\n` search starts.
    /// Avoids rescanning bytes already known not to contain one.
    next_index: usize,
}

impl LineCodec {
    /// Creates a codec that rejects lines longer than `max_length` bytes.
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// True once the unterminated bytes in `buf` can no longer form a
    /// line within the limit. One byte past it is allowed if it is the
    /// `\r` of a CRLF.
    fn over_limit(&self, buf: &[u8]) -> bool {
        match buf.len().checked_sub(self.max_length) {
            None | Some(0) => false,
            Some(1) => buf.get(self.max_length) != Some(&b'\r'),
            Some(_) => true,
        }
    }

    fn too_long(&self) -> ProtocolError {
        ProtocolError::LineTooLong {
            max: self.max_length,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<String>, ProtocolError> {
        // A `\n` can sit at index `max_length + 1` at most, and only
        // behind a `\r`.
        let read_to = buf.len().min(self.max_length.saturating_add(2));
        let newline = buf
            .get(self.next_index..read_to)
            .and_then(|window| window.iter().position(|b| *b == b'\n'));

        match newline {
            Some(offset) => {
                let end = self.next_index + offset;
                let has_cr = end > 0 && buf.get(end - 1) == Some(&b'\r');
                let content_len = if has_cr { end - 1 } else { end };
                if content_len > self.max_length {
                    return Err(self.too_long());
                }
                self.next_index = 0;
                let frame = buf.split_to(end + 1);
                let content = frame.get(..end).unwrap_or_default();
                Ok(Some(decode_line(content)))
            }
            None if self.over_limit(buf) => Err(self.too_long()),
            None => {
                self.next_index = read_to;
                Ok(None)
            }
        }
    }

    fn decode_eof(
        &mut self,
        buf: &mut BytesMut,
    ) -> Result<Option<String>, ProtocolError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let tail = buf.split();
        Ok(Some(decode_line(&tail)))
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = ProtocolError;

    fn encode(
        &mut self,
        line: T,
        buf: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        let line = line.as_ref();
        buf.reserve(line.len() + 1);
        buf.put_slice(line.as_bytes());
        buf.put_u8(b'\n');
        Ok(())
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(data: &[u8]) -> BytesMut {
        BytesMut::from(data)
    }

    #[test]
    fn test_decodes_complete_lines_in_order() {
        let mut codec = LineCodec::new(100);
        let mut data = buf(b"one\ntwo\nthr");

        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("one"));
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("two"));
        assert_eq!(codec.decode(&mut data).unwrap(), None);
        assert_eq!(&data[..], b"thr");

        data.extend_from_slice(b"ee\n");
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("three"));
        assert!(data.is_empty());
    }

    #[test]
    fn test_strips_carriage_return() {
        let mut codec = LineCodec::new(100);
        let mut data = buf(b"hello\r\n");
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_line_is_a_line() {
        let mut codec = LineCodec::new(100);
        let mut data = buf(b"\n");
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_line_at_exact_limit_is_accepted() {
        let mut codec = LineCodec::new(5);
        let mut data = buf(b"abcde\n");
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("abcde"));
    }

    #[test]
    fn test_crlf_line_at_exact_limit_is_accepted() {
        let mut codec = LineCodec::new(5);
        let mut data = buf(b"abcde\r\nxy\r");
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("abcde"));
        assert_eq!(codec.decode(&mut data).unwrap(), None);

        // The `\r` may arrive on its own before the `\n`.
        let mut data = buf(b"abcde\r");
        assert_eq!(codec.decode(&mut data).unwrap(), None);
        data.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut data).unwrap().as_deref(), Some("abcde"));
    }

    #[test]
    fn test_crlf_line_over_limit_is_rejected() {
        let mut codec = LineCodec::new(5);
        let mut data = buf(b"abcdef\r\n");
        assert!(matches!(
            codec.decode(&mut data),
            Err(ProtocolError::LineTooLong { max: 5 })
        ));

        let mut codec = LineCodec::new(5);
        let mut data = buf(b"abcde\rx");
        assert!(matches!(
            codec.decode(&mut data),
            Err(ProtocolError::LineTooLong { max: 5 })
        ));
    }

    #[test]
    fn test_overlong_line_is_rejected_without_terminator() {
        let mut codec = LineCodec::new(5);
        let mut data = buf(b"abcdef");
        let err = codec.decode(&mut data).unwrap_err();
        assert!(matches!(err, ProtocolError::LineTooLong { max: 5 }));
    }

    #[test]
    fn test_overlong_line_is_rejected_even_when_terminated_later() {
        let mut codec = LineCodec::new(3);
        let mut data = buf(b"abcdefgh\n");
        assert!(matches!(
            codec.decode(&mut data),
            Err(ProtocolError::LineTooLong { max: 3 })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new(100);
        let mut data = buf(b"a\xffb\n");
        assert_eq!(
            codec.decode(&mut data).unwrap().as_deref(),
            Some("a\u{FFFD}b")
        );
    }

    #[test]
    fn test_eof_yields_unterminated_tail() {
        let mut codec = LineCodec::new(100);
        let mut data = buf(b"last");
        assert_eq!(codec.decode(&mut data).unwrap(), None);
        assert_eq!(
            codec.decode_eof(&mut data).unwrap().as_deref(),
            Some("last")
        );
        assert_eq!(codec.decode_eof(&mut data).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::default();
        let mut out = BytesMut::new();
        codec.encode("HELLO", &mut out).unwrap();
        codec.encode(String::from("WORLD"), &mut out).unwrap();
        assert_eq!(&out[..], b"HELLO\nWORLD\n");
    }
}
