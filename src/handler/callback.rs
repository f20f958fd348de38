//! Application callback slot.
//!
//! The receive loop hands every non-control message to the registered
//! callback. The callback runs on the receive task, so long blocking work
//! inside it delays both message delivery and shutdown detection.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

/// Callback invoked once per inbound application message.
pub type Callback = Arc<dyn Fn(Value) + Send + Sync + 'static>;

/// Holds at most one callback, shared between the host and the receive task.
#[derive(Clone, Default)]
pub struct CallbackSlot {
    inner: Arc<RwLock<Option<Callback>>>,
}

impl CallbackSlot {
    /// Create a slot, optionally pre-filled.
    pub fn new(callback: Option<Callback>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(callback)),
        }
    }

    /// Register a callback.
    ///
    /// An already registered callback is only replaced when `overwrite` is
    /// set. Returns whether `callback` is now the registered one.
    pub fn register<F>(&self, callback: F, overwrite: bool) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() && !overwrite {
            tracing::warn!(
                "A callback is already registered; pass overwrite = true to replace it"
            );
            return false;
        }
        *slot = Some(Arc::new(callback));
        true
    }

    /// Check if a callback is registered.
    pub fn is_registered(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Invoke the callback with `message`.
    ///
    /// The lock is released before the call so the callback may itself
    /// register a replacement. Returns `false` if no callback is registered
    /// and the message was dropped.
    pub fn dispatch(&self, message: Value) -> bool {
        let callback = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback(message);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for CallbackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_dispatch_without_callback_drops() {
        let slot = CallbackSlot::default();

        assert!(!slot.is_registered());
        assert!(!slot.dispatch(json!({"dropped": true})));
    }

    #[test]
    fn test_dispatch_delivers_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let slot = CallbackSlot::default();
        slot.register(move |msg| sink.lock().unwrap().push(msg), false);

        assert!(slot.dispatch(json!({"greet": "hi"})));

        assert_eq!(*seen.lock().unwrap(), vec![json!({"greet": "hi"})]);
    }

    #[test]
    fn test_register_respects_overwrite_flag() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let slot = CallbackSlot::default();

        let first = hits.clone();
        assert!(slot.register(move |_| first.lock().unwrap().push("first"), false));

        let second = hits.clone();
        assert!(!slot.register(move |_| second.lock().unwrap().push("second"), false));
        slot.dispatch(json!(1));

        let third = hits.clone();
        assert!(slot.register(move |_| third.lock().unwrap().push("third"), true));
        slot.dispatch(json!(2));

        assert_eq!(*hits.lock().unwrap(), vec!["first", "third"]);
    }

    #[test]
    fn test_callback_may_replace_itself() {
        let slot = CallbackSlot::default();
        let inner = slot.clone();
        slot.register(
            move |_| {
                inner.register(|_| {}, true);
            },
            false,
        );

        assert!(slot.dispatch(json!("swap")));
        assert!(slot.is_registered());
    }
}
