//! Pipe file management.
//!
//! A channel named `chan` lives in two FIFOs:
//! - `<dir>/chan`: owner → peer
//! - `<dir>/chan-reverse`: peer → owner
//!
//! # Example
//!
//! ```ignore
//! use fifo_duplex::transport::{create_fifo, PipePaths};
//!
//! let paths = PipePaths::new("/tmp", "chan")?;
//! create_fifo(paths.forward())?;
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::Mode;

use crate::error::{ChannelError, Result};

/// Suffix appended to the channel name for the peer → owner pipe.
pub const REVERSE_SUFFIX: &str = "-reverse";

/// The two pipe paths of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipePaths {
    name: String,
    forward: PathBuf,
    reverse: PathBuf,
}

impl PipePaths {
    /// Build the pipe paths for `name` inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` if the name is empty, contains a path
    /// separator or NUL byte, or is `.`/`..`.
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        validate_name(name)?;
        let dir = dir.as_ref();
        Ok(Self {
            name: name.to_string(),
            forward: dir.join(name),
            reverse: dir.join(format!("{name}{REVERSE_SUFFIX}")),
        })
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owner → peer pipe, created by the owner.
    pub fn forward(&self) -> &Path {
        &self.forward
    }

    /// Peer → owner pipe, created by the peer.
    pub fn reverse(&self) -> &Path {
        &self.reverse
    }

    /// Remove both pipe files. Missing files are not an error; other
    /// failures are logged and skipped so the second path is still tried.
    pub fn remove_all(&self) {
        for path in [&self.forward, &self.reverse] {
            match remove_fifo(path) {
                Ok(true) => tracing::debug!(path = %path.display(), "Removed pipe"),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Could not remove pipe")
                }
            }
        }
    }
}

/// Check that `name` can be used as a single path component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(ChannelError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Create a FIFO at `path`, readable and writable by the current user only.
///
/// # Errors
///
/// Returns `PipeExists` if anything already sits at `path`.
pub fn create_fifo(path: &Path) -> Result<()> {
    match nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Created pipe");
            Ok(())
        }
        Err(Errno::EEXIST) => Err(ChannelError::PipeExists(path.to_path_buf())),
        Err(errno) => Err(ChannelError::Io(errno.into())),
    }
}

/// Remove a pipe file. Returns `Ok(false)` if it was already gone.
pub fn remove_fifo(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Cleanup guard that removes a pipe file on drop unless disarmed.
///
/// Held across the handshake so a failed or interrupted connection attempt
/// never leaves the pipe it created behind.
pub struct PipeCleanup {
    path: PathBuf,
    armed: bool,
}

impl PipeCleanup {
    /// Guard the pipe at `path`.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    /// Keep the pipe file; the guard becomes a no-op.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PipeCleanup {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(path = %self.path.display(), "Cleaning up pipe after failed handshake");
            let _ = remove_fifo(&self.path);
        }
    }
}
