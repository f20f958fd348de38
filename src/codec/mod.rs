//! Codec module - serialization of messages for the wire.
//!
//! - [`JsonCodec`] - compact JSON, one message per line
//!
//! # Example
//!
//! ```
//! use fifo_duplex::codec::JsonCodec;
//! use serde_json::json;
//!
//! let encoded = JsonCodec::encode(&json!({"greet": "hi"})).unwrap();
//! assert_eq!(encoded, b"{\"greet\":\"hi\"}\n");
//!
//! let raw = JsonCodec::encode_raw("{\n  \"greet\": \"hi\"\n}").unwrap();
//! assert_eq!(raw, b"{  \"greet\": \"hi\"}\n");
//! ```

mod json;

pub use json::JsonCodec;
