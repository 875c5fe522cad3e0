//! Line codec for the IRC wire format

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use crate::application::errors::ConnectionError;

/// Longest inbound line accepted, tags included
pub const MAX_INBOUND_BYTES: usize = 8191;

/// Splits the byte stream on `\n`, strips the terminator and decodes lossily.
///
/// Lines longer than the limit are dropped with a warning instead of killing
/// the connection; empty lines are skipped.
pub struct IrcLineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
    /// Inside an overlong line, waiting for its newline
    discarding: bool,
}

impl IrcLineCodec {
    pub fn new() -> Self {
        Self::with_max_len(MAX_INBOUND_BYTES)
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    fn finish(line: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(['\r', '\n']);
        (!text.is_empty()).then(|| text.to_string())
    }
}

impl Default for IrcLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcLineCodec {
    type Item = String;
    type Error = ConnectionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ConnectionError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_len {
                    tracing::warn!("Dropping inbound line over {} bytes", self.max_len);
                    src.clear();
                    self.next_index = 0;
                    self.discarding = true;
                } else {
                    self.next_index = src.len();
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if std::mem::take(&mut self.discarding) {
                continue;
            }
            if line.len() > self.max_len {
                tracing::warn!("Dropping inbound line of {} bytes", line.len());
                continue;
            }
            if let Some(text) = Self::finish(&line) {
                return Ok(Some(text));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ConnectionError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // Unterminated last line
        let rest = src.split();
        self.next_index = 0;
        if std::mem::take(&mut self.discarding) {
            return Ok(None);
        }
        Ok(Self::finish(&rest))
    }
}

impl Encoder<String> for IrcLineCodec {
    type Error = ConnectionError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), ConnectionError> {
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lines() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from(&b"PING :a\r\n\r\nPING :b\nPIN"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :a".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :b".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"G :c\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :c".to_string()));
    }

    #[test]
    fn test_overlong_line_is_skipped() {
        let mut codec = IrcLineCodec::with_max_len(16);
        let mut buf = BytesMut::from(&b"PRIVMSG #x :aaaaaaaaaaaaaaaa"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"aaaa\r\nPING :ok\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :ok".to_string()));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG #x :caf\xe9\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG #x :caf"));
    }

    #[test]
    fn test_unterminated_line_at_eof() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::from(&b"ERROR :bye"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("ERROR :bye".to_string()));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = IrcLineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("NICK mirbot".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"NICK mirbot\r\n");
    }
}
