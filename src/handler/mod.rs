//! Handler module - application callback registration and dispatch.
//!
//! Provides:
//! - [`Callback`] - the host's `Fn(Value)` receiving application messages
//! - [`CallbackSlot`] - the endpoint's single, replaceable callback
//!
//! # Example
//!
//! ```
//! use fifo_duplex::handler::CallbackSlot;
//! use serde_json::json;
//!
//! let slot = CallbackSlot::default();
//! assert!(slot.register(|msg| println!("got {msg}"), false));
//! assert!(slot.dispatch(json!({"greet": "hi"})));
//! ```

mod callback;

pub use callback::{Callback, CallbackSlot};
