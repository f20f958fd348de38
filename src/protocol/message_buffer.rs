//! Message buffer for accumulating partial reads.
//!
//! Pipe reads do not line up with message boundaries: one read may carry
//! several messages written back to back, and a long message may arrive
//! over several reads. The buffer keeps the unread tail in a `BytesMut`.
//!
//! Writers terminate every message with `\n` and compact JSON never holds
//! a raw newline, so a `\n` is a hard boundary: the bytes before it must
//! decode completely or the whole line is reported as malformed. A value
//! cut short by a newline therefore never absorbs the next message.
//!
//! The unterminated tail after the last `\n` is decoded with a streaming
//! decoder, which keeps peers that write bare JSON objects without a
//! terminator working. An incomplete tail waits for more bytes; a tail
//! that can never become valid JSON is dropped.
//!
//! # Example
//!
//! ```
//! use fifo_duplex::protocol::MessageBuffer;
//!
//! let mut buffer = MessageBuffer::new();
//!
//! let first = buffer.push(br#"{"a":1}{"b""#);
//! assert_eq!(first.len(), 1);
//!
//! let second = buffer.push(br#":2}"#);
//! assert_eq!(second.len(), 1);
//! assert!(buffer.is_empty());
//! ```

use bytes::BytesMut;
use serde_json::Value;

use crate::config::DEFAULT_MAX_MESSAGE_SIZE;
use crate::error::{ChannelError, Result};

/// Outcome of one decode attempt at the front of the buffer.
enum Step {
    /// A complete value spanning `consumed` bytes.
    Value(Value, usize),
    /// Only whitespace is buffered.
    Drained,
    /// The value at the front is still incomplete.
    Incomplete,
    /// The bytes at the front can never become valid JSON.
    Malformed(serde_json::Error),
}

/// Buffer for accumulating inbound bytes and extracting complete messages.
pub struct MessageBuffer {
    /// Bytes read but not yet decoded.
    buffer: BytesMut,
    /// Largest incomplete message kept before giving up on it.
    max_message_size: usize,
}

impl MessageBuffer {
    /// Create a buffer with the default size cap.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a buffer that discards incomplete messages larger than
    /// `max_message_size`.
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
            max_message_size,
        }
    }

    /// Push bytes from one read and extract every complete message.
    ///
    /// Each malformed line yields one `Err` item; decoding resumes on the
    /// next line. Values are returned in wire order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<Value>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(end + 1);
            decode_line(&line[..end], &mut messages);
        }
        self.decode_tail(&mut messages);

        messages
    }

    /// Decode what follows the last newline, leaving an incomplete value
    /// in place.
    fn decode_tail(&mut self, messages: &mut Vec<Result<Value>>) {
        loop {
            match self.step() {
                Step::Value(value, consumed) => {
                    let _ = self.buffer.split_to(consumed);
                    messages.push(Ok(value));
                }
                Step::Drained => {
                    self.buffer.clear();
                    return;
                }
                Step::Incomplete => {
                    if self.buffer.len() > self.max_message_size {
                        let size = self.buffer.len();
                        self.buffer.clear();
                        messages.push(Err(ChannelError::MessageTooLarge {
                            size,
                            max: self.max_message_size,
                        }));
                    }
                    return;
                }
                Step::Malformed(e) => {
                    self.buffer.clear();
                    messages.push(Err(ChannelError::Json(e)));
                    return;
                }
            }
        }
    }

    fn step(&self) -> Step {
        let mut stream = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
        match stream.next() {
            None => Step::Drained,
            Some(Ok(value)) => Step::Value(value, stream.byte_offset()),
            Some(Err(e)) if e.is_eof() => Step::Incomplete,
            Some(Err(e)) => Step::Malformed(e),
        }
    }

    /// Number of buffered, not yet decoded bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop any partially received message.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Decode one newline-terminated line. Running out of bytes inside the
/// line is an error like any other.
fn decode_line(line: &[u8], messages: &mut Vec<Result<Value>>) {
    for item in serde_json::Deserializer::from_slice(line).into_iter::<Value>() {
        match item {
            Ok(value) => messages.push(Ok(value)),
            Err(e) => {
                messages.push(Err(ChannelError::Json(e)));
                break;
            }
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(items: Vec<Result<Value>>) -> Vec<Value> {
        items.into_iter().map(|item| item.unwrap()).collect()
    }

    #[test]
    fn test_single_complete_message() {
        let mut buffer = MessageBuffer::new();

        let messages = values(buffer.push(b"{\"greet\":\"hi\"}\n"));

        assert_eq!(messages, vec![json!({"greet": "hi"})]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_coalesced_messages_in_one_push() {
        let mut buffer = MessageBuffer::new();

        let messages = values(buffer.push(b"{\"n\":1}\n{\"n\":2}{\"n\":3}"));

        assert_eq!(messages, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_message_split_across_pushes() {
        let mut buffer = MessageBuffer::new();

        assert!(buffer.push(b"{\"text\":\"hel").is_empty());
        assert!(!buffer.is_empty());

        let messages = values(buffer.push(b"lo\"}\n"));
        assert_eq!(messages, vec![json!({"text": "hello"})]);
    }

    #[test]
    fn test_split_inside_multibyte_character() {
        let mut buffer = MessageBuffer::new();
        let encoded = "{\"word\":\"caf\u{e9}\"}".as_bytes();
        let cut = encoded.len() - 3;

        assert!(buffer.push(&encoded[..cut]).is_empty());
        let messages = values(buffer.push(&encoded[cut..]));

        assert_eq!(messages, vec![json!({"word": "caf\u{e9}"})]);
    }

    #[test]
    fn test_malformed_input_is_reported_and_dropped() {
        let mut buffer = MessageBuffer::new();

        let items = buffer.push(b"{\"ok\":1}not json at all");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &json!({"ok": 1}));
        assert!(matches!(items[1], Err(ChannelError::Json(_))));
        assert!(buffer.is_empty());

        // The next valid message is decoded normally.
        let messages = values(buffer.push(b"{\"ok\":2}"));
        assert_eq!(messages, vec![json!({"ok": 2})]);
    }

    #[test]
    fn test_decoding_resumes_after_malformed_line() {
        let mut buffer = MessageBuffer::new();

        let items = buffer.push(b"garbage\n{\"message\":\"__class__\"}\n{\"greet\":\"hi\"}\n");

        assert_eq!(items.len(), 3);
        assert!(items[0].is_err());
        assert_eq!(items[1].as_ref().unwrap(), &json!({"message": "__class__"}));
        assert_eq!(items[2].as_ref().unwrap(), &json!({"greet": "hi"}));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_truncated_line_does_not_swallow_next_message() {
        let mut buffer = MessageBuffer::new();

        let items = buffer.push(b"{\"a\":\n");
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ChannelError::Json(_))));
        assert!(buffer.is_empty());

        let messages = values(buffer.push(b"{\"greet\":\"hi\"}\n"));
        assert_eq!(messages, vec![json!({"greet": "hi"})]);
    }

    #[test]
    fn test_truncated_line_and_next_message_in_one_push() {
        let mut buffer = MessageBuffer::new();

        let items = buffer.push(b"{\"a\":[1,\n{\"greet\":\"hi\"}\n");

        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1].as_ref().unwrap(), &json!({"greet": "hi"}));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut buffer = MessageBuffer::new();

        let items = buffer.push(b"{\"bad\":\"\xff\xfe\"}");

        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_incomplete_message_is_discarded() {
        let mut buffer = MessageBuffer::with_max_message_size(16);

        let items = buffer.push(b"{\"padding\":\"aaaaaaaaaaaaaaaaaaaa");

        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(ChannelError::MessageTooLarge { max: 16, .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_whitespace_only() {
        let mut buffer = MessageBuffer::new();

        assert!(buffer.push(b"\n \n").is_empty());
        assert!(buffer.is_empty());
    }
}
