//! Incremental decoding of a JSON message stream.
//!
//! The local socket carries back-to-back JSON objects with optional
//! whitespace between them — no line framing, no length prefix, and objects
//! may arrive split across reads. The decoder buffers raw bytes and yields
//! one [`Message`] per complete object.
//!
//! A syntax error is reported once and the decoder resynchronizes by
//! skipping ahead to the next `{`, so one malformed message does not poison
//! the rest of the stream.

use bytes::{Buf, BytesMut};

use crate::messages::Message;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Sans-io decoder: feed bytes with [`extend`], pull messages with [`next`].
///
/// [`extend`]: MessageDecoder::extend
/// [`next`]: MessageDecoder::next
#[derive(Debug, Default)]
pub struct MessageDecoder {
    buf: BytesMut,
}

impl MessageDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Appends bytes read from the connection.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet consumed by a decoded message.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decodes the next complete message.
    ///
    /// Returns `Ok(None)` when the buffer holds no complete value yet (an
    /// incomplete trailing object waits for more bytes). On a syntax error
    /// the input is advanced past the offending bytes before the error is
    /// returned, so calling again continues with the next candidate object.
    pub fn next(&mut self) -> Result<Option<Message>, serde_json::Error> {
        // Leading whitespace between values is not consumed by a failed
        // parse attempt; trim it so an all-whitespace buffer reads as empty.
        while self
            .buf
            .first()
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.buf.advance(1);
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Message>();
        match stream.next() {
            Some(Ok(message)) => {
                let consumed = stream.byte_offset();
                self.buf.advance(consumed);
                Ok(Some(message))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                // Resync: drop at least one byte, then everything up to the
                // next plausible object start.
                let from = stream.byte_offset().max(1).min(self.buf.len());
                let skip = self.buf[from..]
                    .iter()
                    .position(|&b| b == b'{')
                    .map_or(self.buf.len(), |p| from + p);
                self.buf.advance(skip);
                Err(e)
            }
            None => Ok(None),
        }
    }
}
