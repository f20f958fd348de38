//! JSON codec using `serde_json`.
//!
//! Messages are encoded compactly and terminated by a single `\n`. Compact
//! JSON never contains a raw newline, so the receiver can treat the
//! terminator as a message boundary. Decoding lives in
//! [`MessageBuffer`](crate::protocol::MessageBuffer), which has to cope
//! with partial reads.

use crate::error::Result;

/// Line-terminated JSON codec.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value as compact JSON followed by `\n`.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(value)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Wrap pre-encoded JSON text for the wire after checking it parses.
    ///
    /// Line breaks between tokens are dropped so the text stays on one
    /// line. Valid JSON cannot hold a raw line break inside a string.
    ///
    /// # Errors
    ///
    /// Returns error if `text` is not a single JSON value.
    pub fn encode_raw(text: &str) -> Result<Vec<u8>> {
        serde_json::from_str::<serde::de::IgnoredAny>(text)?;
        let mut bytes: Vec<u8> = text
            .trim()
            .bytes()
            .filter(|b| !matches!(b, b'\n' | b'\r'))
            .collect();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    struct Greeting {
        greet: String,
        times: u32,
    }

    #[test]
    fn test_encode_is_single_line() {
        let value = json!({"text": "line one\nline two", "nested": {"a": [1, 2]}});

        let encoded = JsonCodec::encode(&value).unwrap();

        assert_eq!(encoded.last(), Some(&b'\n'));
        assert_eq!(encoded.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn test_encode_struct() {
        let greeting = Greeting {
            greet: "hi".to_string(),
            times: 3,
        };

        let encoded = JsonCodec::encode(&greeting).unwrap();

        assert_eq!(encoded, b"{\"greet\":\"hi\",\"times\":3}\n");
    }

    #[test]
    fn test_encode_raw() {
        let encoded = JsonCodec::encode_raw("  {\"data\":\"x\"}\n").unwrap();
        assert_eq!(encoded, b"{\"data\":\"x\"}\n");

        assert!(JsonCodec::encode_raw("{\"unterminated\":").is_err());
        assert!(JsonCodec::encode_raw("{} {}").is_err());
    }

    #[test]
    fn test_encode_raw_flattens_pretty_json() {
        let encoded = JsonCodec::encode_raw("{\r\n  \"a\": [1,\n 2],\n  \"s\": \"x\\ny\"\n}").unwrap();

        assert_eq!(encoded, b"{  \"a\": [1, 2],  \"s\": \"x\\ny\"}\n");
    }
}
