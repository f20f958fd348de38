//! Endpoint roles and the shutdown state machine.
//!
//! ```text
//! Running --(local or remote trigger)--> ShuttingDown --(handles closed)--> Closed
//! ```
//!
//! Leaving `Running` happens at most once per endpoint: every trigger goes
//! through [`ShutdownState::begin`] while holding the endpoint's send lock,
//! and only the caller that wins the transition runs the teardown.

use std::fmt;

/// Lifecycle state of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownState {
    /// Handshake done, messages flow in both directions.
    Running,
    /// Teardown started; writes are refused.
    ShuttingDown,
    /// Both handles closed.
    Closed,
}

impl ShutdownState {
    /// Move from `Running` to `ShuttingDown`.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn begin(&mut self) -> bool {
        if *self == ShutdownState::Running {
            *self = ShutdownState::ShuttingDown;
            true
        } else {
            false
        }
    }

    /// Whether application writes are still accepted.
    pub fn is_running(self) -> bool {
        self == ShutdownState::Running
    }

    /// Whether teardown has finished.
    pub fn is_closed(self) -> bool {
        self == ShutdownState::Closed
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownState::Running => "running",
            ShutdownState::ShuttingDown => "shutting_down",
            ShutdownState::Closed => "closed",
        })
    }
}

/// Which side of the channel an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Creates the forward pipe, waits for the peer, deletes both pipe
    /// files on shutdown.
    Owner,
    /// Creates the reverse pipe, connects to the owner, never deletes
    /// pipe files once connected.
    Peer,
}

impl Role {
    /// Whether this side removes both pipe files when the channel closes.
    pub fn owns_pipe_files(self) -> bool {
        matches!(self, Role::Owner)
    }

    /// Whether this side answers a remote shutdown with `finish_shutdown`.
    pub fn acks_on_remote_shutdown(self) -> bool {
        matches!(self, Role::Peer)
    }

    /// Lowercase role name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Peer => "peer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
