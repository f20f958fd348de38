//! Connection handshake for both endpoint roles.
//!
//! The owner creates the forward pipe and waits for a reader on it before
//! opening the reverse pipe. The peer creates the reverse pipe, waits for
//! the forward pipe to appear, then waits for the owner to start reading
//! the reverse pipe.
//!
//! ```text
//! owner                                peer
//! mkfifo(P)                            mkfifo(P')
//! open P for write ── retry ENXIO ──┐  open P for read ── retry ENOENT
//!                                   └─ (peer is reading P)
//! open P' for read                     open P' for write ── retry ENXIO
//! ```
//!
//! The write-side open is non-blocking and retried while the platform
//! reports "no reader", which turns the classic blocking open into an
//! accept step that can be bounded by `connect_timeout`.
//!
//! Either side may also be handed an [`Interrupt`] future. Its completion
//! aborts the handshake with `Interrupted`. No signal handler is installed
//! here; hosts wanting Ctrl-C to abort pass a future built on
//! `tokio::signal::ctrl_c`.

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use nix::errno::Errno;
use tokio::net::unix::pipe::{OpenOptions, Receiver, Sender};

use super::pipe::{create_fifo, PipeCleanup, PipePaths};
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};

/// Future whose completion aborts a pending handshake.
pub type Interrupt = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Send and receive handles produced by a completed handshake.
#[derive(Debug)]
pub struct PipeHandles {
    /// Write end of the pipe towards the other endpoint.
    pub sender: Sender,
    /// Non-blocking read end of the pipe from the other endpoint.
    pub receiver: Receiver,
}

/// Owner side of the handshake.
///
/// # Errors
///
/// - `PipeExists` if the forward pipe is already present. Nothing is
///   created or removed in that case.
/// - `ConnectTimeout` if no peer attaches within `connect_timeout`, or
///   `Interrupted` if `interrupt` completes first. The forward pipe is
///   removed again in both cases.
pub async fn accept(
    paths: &PipePaths,
    config: &ChannelConfig,
    interrupt: Option<Interrupt>,
) -> Result<PipeHandles> {
    create_fifo(paths.forward())?;
    let guard = PipeCleanup::new(paths.forward());

    tracing::info!(channel = paths.name(), "Waiting for peer to connect");
    let attempt = with_deadline(config.connect_timeout, async {
        let sender = open_sender_when_read(paths.forward(), config.connect_retry_interval).await?;
        tracing::info!(channel = paths.name(), "Peer connected, opening reverse channel");
        let receiver = OpenOptions::new().open_receiver(paths.reverse())?;
        Ok(PipeHandles { sender, receiver })
    });
    let handles = interruptible(paths, attempt, interrupt).await?;

    guard.disarm();
    Ok(handles)
}

/// Peer side of the handshake.
///
/// Retries until the owner has created the forward pipe and opened the
/// reverse pipe for reading. Completion of `interrupt` during the wait
/// aborts with `Interrupted`. The reverse pipe created here is removed on
/// every failure path; the owner's forward pipe is left alone.
pub async fn connect(
    paths: &PipePaths,
    config: &ChannelConfig,
    interrupt: Option<Interrupt>,
) -> Result<PipeHandles> {
    create_fifo(paths.reverse())?;
    let guard = PipeCleanup::new(paths.reverse());

    tracing::info!(channel = paths.name(), "Connecting to owner");
    let attempt = with_deadline(config.connect_timeout, async {
        let receiver =
            open_receiver_when_created(paths.forward(), config.connect_retry_interval).await?;
        let sender = open_sender_when_read(paths.reverse(), config.connect_retry_interval).await?;
        Ok(PipeHandles { sender, receiver })
    });

    let handles = interruptible(paths, attempt, interrupt).await?;

    guard.disarm();
    tracing::info!(channel = paths.name(), "Connected to owner");
    Ok(handles)
}

/// Open `path` for writing once some process has it open for reading.
async fn open_sender_when_read(path: &Path, retry: Duration) -> Result<Sender> {
    loop {
        match OpenOptions::new().open_sender(path) {
            Ok(sender) => return Ok(sender),
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                tokio::time::sleep(retry).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Open `path` for non-blocking reading once it exists.
async fn open_receiver_when_created(path: &Path, retry: Duration) -> Result<Receiver> {
    loop {
        match OpenOptions::new().open_receiver(path) {
            Ok(receiver) => return Ok(receiver),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tokio::time::sleep(retry).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn interruptible<T, F>(paths: &PipePaths, attempt: F, interrupt: Option<Interrupt>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(interrupt) = interrupt else {
        return attempt.await;
    };
    tokio::select! {
        result = attempt => result,
        () = interrupt => {
            tracing::error!(channel = paths.name(), "Connection interrupted, cleaning up");
            Err(ChannelError::Interrupted)
        }
    }
}

async fn with_deadline<T, F>(limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ChannelError::ConnectTimeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config(dir: &Path) -> ChannelConfig {
        ChannelConfig {
            pipe_dir: dir.to_path_buf(),
            connect_retry_interval: Duration::from_millis(5),
            connect_timeout: Some(Duration::from_millis(100)),
            ..ChannelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_handshake_pairs_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(dir.path());
        let config = ChannelConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..config
        };
        let paths = PipePaths::new(dir.path(), "pair").unwrap();

        let (owner, peer) = tokio::join!(accept(&paths, &config, None), connect(&paths, &config, None));

        assert!(owner.is_ok());
        assert!(peer.is_ok());
        assert!(paths.forward().exists());
        assert!(paths.reverse().exists());
    }

    #[tokio::test]
    async fn test_accept_timeout_removes_forward_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(dir.path());
        let paths = PipePaths::new(dir.path(), "lonely").unwrap();

        let err = accept(&paths, &config, None).await.unwrap_err();

        assert!(matches!(err, ChannelError::ConnectTimeout(_)));
        assert!(!paths.forward().exists());
    }

    #[tokio::test]
    async fn test_connect_timeout_removes_reverse_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(dir.path());
        let paths = PipePaths::new(dir.path(), "nobody-home").unwrap();

        let err = connect(&paths, &config, None).await.unwrap_err();

        assert!(matches!(err, ChannelError::ConnectTimeout(_)));
        assert!(!paths.reverse().exists());
    }

    #[tokio::test]
    async fn test_accept_stale_pipe_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(dir.path());
        let paths = PipePaths::new(dir.path(), "stale").unwrap();
        create_fifo(paths.forward()).unwrap();

        let err = accept(&paths, &config, None).await.unwrap_err();

        assert!(matches!(err, ChannelError::PipeExists(_)));
        assert!(paths.forward().exists());
    }

    fn after(delay: Duration) -> Option<Interrupt> {
        Some(Box::pin(tokio::time::sleep(delay)))
    }

    #[tokio::test]
    async fn test_interrupted_connect_removes_reverse_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig {
            connect_timeout: None,
            ..quick_config(dir.path())
        };
        let paths = PipePaths::new(dir.path(), "cancelled").unwrap();

        let err = connect(&paths, &config, after(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::Interrupted));
        assert!(!paths.reverse().exists());
    }

    #[tokio::test]
    async fn test_interrupted_accept_removes_forward_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig {
            connect_timeout: None,
            ..quick_config(dir.path())
        };
        let paths = PipePaths::new(dir.path(), "cancelled").unwrap();

        let err = accept(&paths, &config, after(Duration::from_millis(50)))
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::Interrupted));
        assert!(!paths.forward().exists());
    }

    #[tokio::test]
    async fn test_pending_interrupt_does_not_disturb_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChannelConfig {
            connect_timeout: Some(Duration::from_secs(5)),
            ..quick_config(dir.path())
        };
        let paths = PipePaths::new(dir.path(), "patient").unwrap();

        let (owner, peer) = tokio::join!(
            accept(&paths, &config, Some(Box::pin(std::future::pending::<()>()))),
            connect(&paths, &config, Some(Box::pin(std::future::pending::<()>()))),
        );

        assert!(owner.is_ok());
        assert!(peer.is_ok());
    }
}
