//! Transport module - named pipe files and the connection handshake.
//!
//! Provides:
//! - [`PipePaths`] - the two FIFO paths of a channel
//! - [`accept`] / [`connect`] - owner and peer sides of the handshake

mod handshake;
mod pipe;

pub use handshake::{accept, connect, Interrupt, PipeHandles};
pub use pipe::{
    create_fifo, remove_fifo, validate_name, PipeCleanup, PipePaths, REVERSE_SUFFIX,
};
