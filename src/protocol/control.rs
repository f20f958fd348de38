//! Control vocabulary and inbound message classification.
//!
//! Two envelope shapes are reserved for channel lifecycle coordination:
//!
//! - `{"message": "shutdown" | "remote_shutdown"}` - zero-argument control call
//! - `{"data": "finish_shutdown"}` - peer's acknowledgment of a shutdown request
//!
//! Everything else is application data.
//!
//! # Example
//!
//! ```
//! use fifo_duplex::protocol::{ControlMessage, Envelope};
//! use serde_json::json;
//!
//! let envelope = Envelope::classify(json!({"message": "remote_shutdown"}));
//! assert_eq!(envelope, Envelope::Control(ControlMessage::RemoteShutdown));
//!
//! let envelope = Envelope::classify(json!({"greet": "hi"}));
//! assert_eq!(envelope, Envelope::Application(json!({"greet": "hi"})));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ChannelError;

/// Field carrying a control call name.
pub const MESSAGE_FIELD: &str = "message";

/// Field carrying the shutdown acknowledgment.
pub const DATA_FIELD: &str = "data";

/// Value of [`DATA_FIELD`] acknowledging a shutdown request.
pub const FINISH_SHUTDOWN: &str = "finish_shutdown";

/// The closed set of control calls one endpoint may ask of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    /// Run the receiver's own locally-initiated shutdown.
    Shutdown,
    /// The sender is shutting down; tear down the receiving side.
    RemoteShutdown,
}

impl ControlMessage {
    /// Wire name of this control call.
    pub fn as_str(self) -> &'static str {
        match self {
            ControlMessage::Shutdown => "shutdown",
            ControlMessage::RemoteShutdown => "remote_shutdown",
        }
    }

    /// The `{"message": <name>}` envelope for this call.
    pub fn to_value(self) -> Value {
        json!({ "message": self.as_str() })
    }
}

impl FromStr for ControlMessage {
    type Err = ChannelError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "shutdown" => Ok(ControlMessage::Shutdown),
            "remote_shutdown" => Ok(ControlMessage::RemoteShutdown),
            other => Err(ChannelError::UnknownControl(other.to_string())),
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{"data": "finish_shutdown"}` acknowledgment.
pub fn finish_shutdown() -> Value {
    json!({ "data": FINISH_SHUTDOWN })
}

/// What a decoded inbound value means to the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A falsy value: null, `false`, zero, or an empty object, array or
    /// string. Ignored.
    Empty,
    /// A recognized control call.
    Control(ControlMessage),
    /// Shutdown acknowledgment from the peer.
    FinishShutdown,
    /// A `message` field outside the control vocabulary. Never dispatched.
    Rejected(String),
    /// Anything else, handed to the application callback.
    Application(Value),
}

impl Envelope {
    /// Classify a decoded value.
    ///
    /// Falsy values are [`Envelope::Empty`]. A truthy `message` field makes
    /// the value a control call; names outside the vocabulary, and truthy
    /// non-string values, become [`Envelope::Rejected`]. A falsy `message`
    /// (`null`, `false`, `0`, `""`, ...) leaves the value to the application.
    pub fn classify(value: Value) -> Self {
        if is_falsy(&value) {
            return Envelope::Empty;
        }

        match value.get(MESSAGE_FIELD) {
            None => {}
            Some(field) if is_falsy(field) => {}
            Some(Value::String(name)) => {
                return match name.parse::<ControlMessage>() {
                    Ok(control) => Envelope::Control(control),
                    Err(_) => Envelope::Rejected(name.clone()),
                };
            }
            Some(other) => return Envelope::Rejected(other.to_string()),
        }

        if value.get(DATA_FIELD).and_then(Value::as_str) == Some(FINISH_SHUTDOWN) {
            return Envelope::FinishShutdown;
        }

        Envelope::Application(value)
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_names() {
        assert_eq!("shutdown".parse::<ControlMessage>().unwrap(), ControlMessage::Shutdown);
        assert_eq!(
            "remote_shutdown".parse::<ControlMessage>().unwrap(),
            ControlMessage::RemoteShutdown
        );
        assert!(matches!(
            "__init__".parse::<ControlMessage>(),
            Err(ChannelError::UnknownControl(name)) if name == "__init__"
        ));
    }

    #[test]
    fn test_control_envelope_shape() {
        assert_eq!(
            ControlMessage::RemoteShutdown.to_value(),
            json!({"message": "remote_shutdown"})
        );
        assert_eq!(finish_shutdown(), json!({"data": "finish_shutdown"}));
        assert_eq!(
            serde_json::to_value(ControlMessage::Shutdown).unwrap(),
            json!("shutdown")
        );
    }

    #[test]
    fn test_classify_control() {
        assert_eq!(
            Envelope::classify(json!({"message": "shutdown"})),
            Envelope::Control(ControlMessage::Shutdown)
        );
        assert_eq!(
            Envelope::classify(json!({"message": "remote_shutdown"})),
            Envelope::Control(ControlMessage::RemoteShutdown)
        );
    }

    #[test]
    fn test_classify_rejects_unknown_control() {
        assert_eq!(
            Envelope::classify(json!({"message": "write"})),
            Envelope::Rejected("write".to_string())
        );
        assert_eq!(
            Envelope::classify(json!({"message": 7})),
            Envelope::Rejected("7".to_string())
        );
        assert_eq!(
            Envelope::classify(json!({"message": true})),
            Envelope::Rejected("true".to_string())
        );
    }

    #[test]
    fn test_classify_ack() {
        assert_eq!(
            Envelope::classify(json!({"data": "finish_shutdown"})),
            Envelope::FinishShutdown
        );
        // Other data values are ordinary payloads.
        assert_eq!(
            Envelope::classify(json!({"data": "progress"})),
            Envelope::Application(json!({"data": "progress"}))
        );
    }

    #[test]
    fn test_classify_empty() {
        for value in [
            json!(null),
            json!(false),
            json!(0),
            json!(0.0),
            json!({}),
            json!([]),
            json!(""),
        ] {
            assert_eq!(Envelope::classify(value), Envelope::Empty);
        }
    }

    #[test]
    fn test_classify_application() {
        for value in [
            json!({"greet": "hi"}),
            json!({"message": null, "x": 1}),
            json!({"message": "", "x": 1}),
            json!({"message": false, "x": 1}),
            json!({"message": 0, "x": 1}),
            json!([1, 2, 3]),
            json!(true),
            json!(-1),
        ] {
            assert_eq!(Envelope::classify(value.clone()), Envelope::Application(value));
        }
    }
}
