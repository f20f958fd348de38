//! Error types for fifo-duplex.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for all channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// I/O error during pipe operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The pipe file is already present, usually left behind by an
    /// endpoint that did not shut down cleanly.
    #[error("Pipe already exists: {}", .0.display())]
    PipeExists(PathBuf),

    /// Channel name cannot be turned into a pipe path.
    #[error("Invalid channel name: {0:?}")]
    InvalidName(String),

    /// The other endpoint did not attach within the configured bound.
    #[error("Timed out after {0:?} waiting for the other endpoint to connect")]
    ConnectTimeout(Duration),

    /// The peer did not acknowledge the shutdown request in time.
    #[error("Timed out after {0:?} waiting for shutdown acknowledgment")]
    AckTimeout(Duration),

    /// Handshake interrupted by Ctrl-C.
    #[error("Handshake interrupted")]
    Interrupted,

    /// Write attempted after shutdown began.
    #[error("Channel closed")]
    Closed,

    /// Message exceeds the configured maximum size.
    #[error("Message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Size of the rejected message in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// A `message` field named something outside the control vocabulary.
    #[error("Unknown control message: {0}")]
    UnknownControl(String),

    /// The receive task panicked or was cancelled.
    #[error("Receive task failed: {0}")]
    TaskFailed(String),
}

/// Result type alias using ChannelError.
pub type Result<T> = std::result::Result<T, ChannelError>;
