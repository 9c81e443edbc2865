//! Splits a byte stream into JSON values.
//!
//! Messages carry no delimiter: a value is complete once the JSON
//! deserializer accepts it. Partial input is kept until more bytes arrive.

use fa_common::ProtocolError;
use serde_json::Value;

/// Per-connection accumulation buffer.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl FrameBuffer {
    /// `limit` bounds the bytes held for one incomplete message.
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Bytes buffered for a message still in progress.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append `bytes` and return every value completed by them, in order.
    ///
    /// A syntax error is reported as [`ProtocolError::Malformed`] and parsing
    /// resumes at the next `{`, so requests behind the bad input still
    /// decode. Exceeding the size limit discards everything buffered and is
    /// reported as [`ProtocolError::MessageTooLarge`].
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Value, ProtocolError>> {
        self.buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        'scan: while consumed < self.buf.len() {
            let start = consumed;
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buf[start..]).into_iter::<Value>();
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = start + stream.byte_offset();
                        frames.push(Ok(value));
                    }
                    Some(Err(err)) if err.is_eof() => break 'scan,
                    Some(Err(err)) => {
                        frames.push(Err(ProtocolError::Malformed(err.to_string())));
                        let bad = consumed
                            + self.buf[consumed..]
                                .iter()
                                .take_while(|b| b.is_ascii_whitespace())
                                .count();
                        let resume = self
                            .buf
                            .get(bad + 1..)
                            .and_then(|rest| rest.iter().position(|&b| b == b'{'));
                        match resume {
                            Some(offset) => {
                                consumed = bad + 1 + offset;
                                continue 'scan;
                            }
                            None => {
                                consumed = self.buf.len();
                                break 'scan;
                            }
                        }
                    }
                    None => {
                        consumed = self.buf.len();
                        break 'scan;
                    }
                }
            }
        }

        self.buf.drain(..consumed);
        let leading = self
            .buf
            .iter()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
        self.buf.drain(..leading);

        if self.buf.len() > self.limit {
            self.buf.clear();
            frames.push(Err(ProtocolError::MessageTooLarge { limit: self.limit }));
        }
        frames
    }
}
