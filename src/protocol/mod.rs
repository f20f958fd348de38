//! Protocol module - control vocabulary and message decoding.
//!
//! This module implements the JSON message layer on top of the pipes:
//! - Reserved control envelopes and their classification
//! - Message buffer for decoding values out of partial reads

mod control;
mod message_buffer;

pub use control::{
    finish_shutdown, ControlMessage, Envelope, DATA_FIELD, FINISH_SHUTDOWN, MESSAGE_FIELD,
};
pub use message_buffer::MessageBuffer;
