//! Channel configuration.
//!
//! Every endpoint is driven by a [`ChannelConfig`]. The defaults reproduce
//! the classic behavior: pipes live in `/tmp`, reads take at most 1024
//! bytes, the receive loop sleeps 100 ms between polls, and neither the
//! handshake nor the shutdown acknowledgment is bounded in time.

use std::path::PathBuf;
use std::time::Duration;

/// Default directory holding the pipe files.
pub const DEFAULT_PIPE_DIR: &str = "/tmp";

/// Default maximum bytes taken by a single non-blocking read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default sleep between receive-loop iterations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default delay between handshake retries.
pub const DEFAULT_CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Default cap on a single message (encoded or buffered while incomplete).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Configuration shared by both endpoint roles.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Directory in which `<name>` and `<name>-reverse` are created.
    pub pipe_dir: PathBuf,
    /// Maximum bytes taken by one read from the receive handle.
    pub read_buffer_size: usize,
    /// Sleep between receive-loop iterations. Bounds message latency.
    pub poll_interval: Duration,
    /// Delay between attempts to open a pipe the other side has not
    /// created or opened yet.
    pub connect_retry_interval: Duration,
    /// Upper bound on the whole handshake. `None` waits forever.
    pub connect_timeout: Option<Duration>,
    /// Upper bound on the owner's wait for `finish_shutdown`. `None`
    /// waits until the peer answers or hangs up.
    pub ack_timeout: Option<Duration>,
    /// Largest message accepted for sending or kept in the receive buffer.
    pub max_message_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            pipe_dir: PathBuf::from(DEFAULT_PIPE_DIR),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            connect_retry_interval: DEFAULT_CONNECT_RETRY_INTERVAL,
            connect_timeout: None,
            ack_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
