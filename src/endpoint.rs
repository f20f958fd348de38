//! Endpoint builder, receive loop and shutdown coordination.
//!
//! The [`EndpointBuilder`] configures one side of a channel. The
//! [`Endpoint`] it produces manages the lifecycle:
//! 1. Handshake (owner accepts, peer connects)
//! 2. Receive loop on a background task: poll, decode, dispatch
//! 3. Shutdown, started locally or by the other endpoint
//!
//! # Example
//!
//! ```ignore
//! use fifo_duplex::Endpoint;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> fifo_duplex::Result<()> {
//!     let owner = Endpoint::owner_builder()
//!         .callback(|msg| println!("owner got {msg}"))
//!         .initialize("chan")
//!         .await?;
//!
//!     owner.write(&json!({"greet": "hi"})).await?;
//!
//!     owner.shutdown().await?;
//!     owner.shutdown_channel().await
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe::{Receiver, Sender};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::codec::JsonCodec;
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::handler::{Callback, CallbackSlot};
use crate::protocol::{finish_shutdown, ControlMessage, Envelope, MessageBuffer};
use crate::shutdown::{Role, ShutdownState};
use crate::transport::{self, Interrupt, PipeHandles, PipePaths};

/// Builder for configuring and initializing one endpoint.
pub struct EndpointBuilder {
    role: Role,
    config: ChannelConfig,
    callback: Option<Callback>,
    interrupt: Option<Interrupt>,
}

impl EndpointBuilder {
    /// Create a builder for the given role with default configuration.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            config: ChannelConfig::default(),
            callback: None,
            interrupt: None,
        }
    }

    /// Register the application callback up front.
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Directory holding the pipe files.
    ///
    /// Default: `/tmp`
    pub fn pipe_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pipe_dir = dir.into();
        self
    }

    /// Maximum bytes per read.
    ///
    /// Default: 1024
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Sleep between receive-loop iterations.
    ///
    /// Default: 100 ms
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Delay between handshake retries.
    ///
    /// Default: 10 ms
    pub fn connect_retry_interval(mut self, interval: Duration) -> Self {
        self.config.connect_retry_interval = interval;
        self
    }

    /// Bound the handshake.
    ///
    /// Default: unbounded
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Bound the owner's wait for the peer's shutdown acknowledgment.
    ///
    /// Default: unbounded
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = Some(timeout);
        self
    }

    /// Largest message sent or buffered.
    ///
    /// Default: 64 KiB
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Abort the handshake with `Interrupted` once `interrupt` completes.
    ///
    /// Nothing interrupts the handshake by default. For Ctrl-C, pass a
    /// future awaiting `tokio::signal::ctrl_c()`.
    pub fn interrupt_on<F>(mut self, interrupt: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.interrupt = Some(Box::pin(interrupt));
        self
    }

    /// Run the handshake for channel `name` and start the receive loop.
    ///
    /// Resolves once both pipes are open in both directions.
    ///
    /// # Errors
    ///
    /// - `InvalidName` if `name` cannot be a file name
    /// - `PipeExists` if this side's pipe file is already present
    /// - `ConnectTimeout` / `Interrupted` if the other side never attaches
    pub async fn initialize(self, name: &str) -> Result<Endpoint> {
        Endpoint::start(self, name).await
    }
}

/// Send side of an endpoint. Guarded by the lock that also serializes
/// shutdown initiation.
struct WriteSide {
    sender: Option<Sender>,
}

/// Receive side of an endpoint.
struct ReadSide {
    receiver: Option<Receiver>,
    buffer: MessageBuffer,
    /// The other side's write end has been closed.
    hung_up: bool,
}

/// State shared between the host-facing [`Endpoint`] and its receive task.
struct Shared {
    role: Role,
    paths: PipePaths,
    config: ChannelConfig,
    write: Mutex<WriteSide>,
    read: Mutex<ReadSide>,
    callback: CallbackSlot,
    /// Only moved out of `Running` while `write` is held.
    state: watch::Sender<ShutdownState>,
    /// Stop signal observed by the receive loop.
    stop: watch::Sender<bool>,
    remote_initiated: AtomicBool,
    /// `finish_shutdown` seen by the receive loop before the ack wait began.
    ack_received: AtomicBool,
}

/// One side of a running channel.
///
/// Use `write()` to send messages, `shutdown()` to close the channel and
/// notify the other side, and `shutdown_channel()` before exiting to join
/// the background receive task.
pub struct Endpoint {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Endpoint {
    /// Create a builder for the given role.
    pub fn builder(role: Role) -> EndpointBuilder {
        EndpointBuilder::new(role)
    }

    /// Create a builder for the owner role.
    pub fn owner_builder() -> EndpointBuilder {
        EndpointBuilder::new(Role::Owner)
    }

    /// Create a builder for the peer role.
    pub fn peer_builder() -> EndpointBuilder {
        EndpointBuilder::new(Role::Peer)
    }

    /// Initialize an owner endpoint with default configuration and no callback.
    pub async fn owner(name: &str) -> Result<Self> {
        Self::owner_builder().initialize(name).await
    }

    /// Initialize a peer endpoint with default configuration and no callback.
    pub async fn peer(name: &str) -> Result<Self> {
        Self::peer_builder().initialize(name).await
    }

    async fn start(builder: EndpointBuilder, name: &str) -> Result<Self> {
        let EndpointBuilder {
            role,
            config,
            callback,
            interrupt,
        } = builder;
        let paths = PipePaths::new(&config.pipe_dir, name)?;
        tracing::info!(channel = name, role = %role, "Initializing channel endpoint");

        let handshake = match role {
            Role::Owner => transport::accept(&paths, &config, interrupt).await,
            Role::Peer => transport::connect(&paths, &config, interrupt).await,
        };
        let PipeHandles { sender, receiver } = match handshake {
            Ok(handles) => handles,
            Err(ChannelError::PipeExists(path)) => {
                tracing::error!(
                    path = %path.display(),
                    "Could not create pipe, another endpoint may not have shut down cleanly"
                );
                return Err(ChannelError::PipeExists(path));
            }
            Err(e) => return Err(e),
        };

        if callback.is_none() {
            tracing::warn!(
                channel = name,
                "No callback passed at initialization, use Endpoint::register_callback to register one"
            );
        }

        let (stop, stop_rx) = watch::channel(false);
        let (state, _) = watch::channel(ShutdownState::Running);
        let shared = Arc::new(Shared {
            role,
            write: Mutex::new(WriteSide {
                sender: Some(sender),
            }),
            read: Mutex::new(ReadSide {
                receiver: Some(receiver),
                buffer: MessageBuffer::with_max_message_size(config.max_message_size),
                hung_up: false,
            }),
            callback: CallbackSlot::new(callback),
            state,
            stop,
            remote_initiated: AtomicBool::new(false),
            ack_received: AtomicBool::new(false),
            paths,
            config,
        });

        let task = tokio::spawn(receive_loop(Arc::clone(&shared), stop_rx));
        tracing::info!(channel = name, role = %role, "Channel endpoint initialized");

        Ok(Self {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Register the application callback.
    ///
    /// An existing callback is kept unless `overwrite` is set. Returns
    /// whether `callback` was installed.
    pub fn register_callback<F>(&self, callback: F, overwrite: bool) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.shared.callback.register(callback, overwrite)
    }

    /// Send a message to the other endpoint.
    ///
    /// # Errors
    ///
    /// - `Closed` once shutdown has begun
    /// - `MessageTooLarge` if the encoding exceeds `max_message_size`
    /// - `Io` if the pipe write fails (e.g. the other side went away)
    pub async fn write<T: Serialize + ?Sized>(&self, message: &T) -> Result<()> {
        let bytes = JsonCodec::encode(message)?;
        self.shared.send(&bytes).await
    }

    /// Send pre-encoded JSON text. The text must hold exactly one value.
    pub async fn write_raw(&self, text: &str) -> Result<()> {
        let bytes = JsonCodec::encode_raw(text)?;
        self.shared.send(&bytes).await
    }

    /// Gracefully shut the channel down and notify the other side.
    ///
    /// The owner waits for the peer's `finish_shutdown` before removing
    /// both pipe files. Calling this more than once, or after the other
    /// side already closed the channel, is a no-op.
    ///
    /// # Errors
    ///
    /// `AckTimeout` if `ack_timeout` is set and the peer stays silent. The
    /// pipes are closed and removed regardless.
    pub async fn shutdown(&self) -> Result<()> {
        self.shared.local_shutdown().await
    }

    /// Stop the receive task and wait for it to finish.
    ///
    /// If the channel is still running this performs the same teardown as
    /// [`shutdown`](Self::shutdown) from the background task. Must be called
    /// before the host exits.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the receive loop, if any.
    pub async fn shutdown_channel(&self) -> Result<()> {
        self.shared.stop.send_replace(true);

        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(ChannelError::TaskFailed(e.to_string())),
        }
    }

    /// Wait until the endpoint reaches [`ShutdownState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state_changes();
        let _ = state.wait_for(|state| state.is_closed()).await;
    }

    /// Subscribe to lifecycle transitions.
    ///
    /// The receiver is notified once per transition; a shutdown triggered
    /// twice still produces a single `ShuttingDown` and a single `Closed`.
    pub fn state_changes(&self) -> watch::Receiver<ShutdownState> {
        self.shared.state.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShutdownState {
        *self.shared.state.borrow()
    }

    /// Whether the shutdown was driven by the other endpoint.
    pub fn is_remote_initiated(&self) -> bool {
        self.shared.remote_initiated.load(Ordering::Acquire)
    }

    /// Role of this endpoint.
    pub fn role(&self) -> Role {
        self.shared.role
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        self.shared.paths.name()
    }

    /// Pipe file paths of this channel.
    pub fn paths(&self) -> &PipePaths {
        &self.shared.paths
    }

    /// Active configuration.
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name())
            .field("role", &self.role())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        // Lets a still-running receive task tear the channel down on its own.
        self.shared.stop.send_replace(true);
    }
}

impl Shared {
    /// Lock-guarded application write.
    async fn send(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.config.max_message_size {
            return Err(ChannelError::MessageTooLarge {
                size: bytes.len(),
                max: self.config.max_message_size,
            });
        }

        let mut write = self.write.lock().await;
        if !self.state.borrow().is_running() {
            return Err(ChannelError::Closed);
        }
        Self::send_on(&mut write, bytes).await
    }

    async fn send_on(write: &mut WriteSide, bytes: &[u8]) -> Result<()> {
        let sender = write.sender.as_mut().ok_or(ChannelError::Closed)?;
        sender.write_all(bytes).await?;
        sender.flush().await?;
        Ok(())
    }

    /// Send a control envelope during teardown. A peer that is already
    /// gone is not an error at this point.
    async fn send_control(&self, write: &mut WriteSide, message: &Value) {
        let result = match JsonCodec::encode(message) {
            Ok(bytes) => Self::send_on(write, &bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(
                channel = self.paths.name(),
                role = %self.role,
                error = %e,
                control = %message,
                "Could not deliver control message"
            );
        }
    }

    /// Shutdown prologue: take the send lock, leave `Running`, raise the
    /// stop signal. Returns the send lock only to the single caller that
    /// performed the transition.
    async fn pre_shutdown(&self) -> Option<MutexGuard<'_, WriteSide>> {
        let write = self.write.lock().await;
        let won = self.state.send_if_modified(|state| state.begin());
        self.stop.send_replace(true);

        if won {
            Some(write)
        } else {
            tracing::debug!(
                channel = self.paths.name(),
                role = %self.role,
                "Shutdown already in progress"
            );
            None
        }
    }

    async fn local_shutdown(&self) -> Result<()> {
        let Some(mut write) = self.pre_shutdown().await else {
            return Ok(());
        };
        tracing::info!(channel = self.paths.name(), role = %self.role, "Shutting down");

        tracing::debug!("Notifying the other endpoint");
        self.send_control(&mut write, &ControlMessage::RemoteShutdown.to_value())
            .await;
        write.sender = None;
        drop(write);

        let mut read = self.read.lock().await;
        let result = if self.role.owns_pipe_files() {
            tracing::debug!("Waiting for shutdown acknowledgment");
            let acked = self.await_ack(&mut read).await;
            read.receiver = None;
            self.paths.remove_all();
            acked
        } else {
            read.receiver = None;
            Ok(())
        };
        read.buffer.clear();
        drop(read);

        self.state.send_replace(ShutdownState::Closed);
        tracing::info!(channel = self.paths.name(), role = %self.role, "Shutdown finished");
        result
    }

    async fn remote_shutdown(&self) {
        let Some(mut write) = self.pre_shutdown().await else {
            return;
        };
        self.remote_initiated.store(true, Ordering::Release);
        tracing::info!(
            channel = self.paths.name(),
            role = %self.role,
            "Received shutdown request from the other endpoint"
        );

        if self.role.acks_on_remote_shutdown() {
            self.close_receiver().await;
            self.send_control(&mut write, &finish_shutdown()).await;
            write.sender = None;
        } else {
            write.sender = None;
            self.close_receiver().await;
            self.paths.remove_all();
        }
        drop(write);

        self.state.send_replace(ShutdownState::Closed);
        tracing::info!(channel = self.paths.name(), role = %self.role, "Shutdown finished");
    }

    /// Teardown after a fatal receive error.
    async fn abandon(&self) {
        let mut write = self.write.lock().await;
        self.state.send_if_modified(|state| state.begin());
        self.stop.send_replace(true);
        write.sender = None;
        drop(write);

        self.close_receiver().await;
        if self.role.owns_pipe_files() {
            self.paths.remove_all();
        }
        self.state.send_if_modified(|state| {
            if state.is_closed() {
                false
            } else {
                *state = ShutdownState::Closed;
                true
            }
        });
    }

    async fn close_receiver(&self) {
        let mut read = self.read.lock().await;
        read.receiver = None;
        read.buffer.clear();
    }

    /// Block until the peer sends `finish_shutdown` or hangs up.
    async fn await_ack(&self, read: &mut ReadSide) -> Result<()> {
        let wait = async {
            let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
            loop {
                if self.ack_received.load(Ordering::Acquire) {
                    return Ok(());
                }
                let Some(receiver) = read.receiver.as_ref() else {
                    return Ok(());
                };

                receiver.readable().await?;
                match receiver.try_read(&mut buf) {
                    Ok(0) => {
                        tracing::warn!(
                            channel = self.paths.name(),
                            "Other endpoint hung up without acknowledging shutdown"
                        );
                        return Ok(());
                    }
                    Ok(n) => {
                        for item in read.buffer.push(&buf[..n]) {
                            match item.map(Envelope::classify) {
                                Ok(Envelope::FinishShutdown) => {
                                    self.ack_received.store(true, Ordering::Release);
                                }
                                Ok(other) => tracing::debug!(
                                    ?other,
                                    "Ignoring message received while awaiting acknowledgment"
                                ),
                                Err(e) => {
                                    tracing::warn!(error = %e, "Invalid data received, discarding")
                                }
                            }
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => return Err(ChannelError::Io(e)),
                }
            }
        };

        match self.config.ack_timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ChannelError::AckTimeout(limit))?,
            None => wait.await,
        }
    }

    /// One non-blocking read. Returns every message completed by it.
    async fn poll_read(&self, buf: &mut [u8]) -> Result<Vec<Result<Value>>> {
        let mut read = self.read.lock().await;
        let Some(receiver) = read.receiver.as_ref() else {
            return Ok(Vec::new());
        };

        match receiver.try_read(buf) {
            Ok(0) => {
                if !read.hung_up {
                    read.hung_up = true;
                    tracing::info!(
                        channel = self.paths.name(),
                        role = %self.role,
                        "Other endpoint closed its send pipe"
                    );
                }
                Ok(Vec::new())
            }
            Ok(n) => {
                read.hung_up = false;
                tracing::debug!(bytes = n, "Received data");
                Ok(read.buffer.push(&buf[..n]))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(ChannelError::Io(e)),
        }
    }

    /// Act on one decoded message. Once shutdown has begun only the
    /// acknowledgment is still honored; everything else left in the same
    /// read is dropped.
    async fn dispatch(&self, message: Value) -> Result<()> {
        let envelope = Envelope::classify(message);
        let running = self.state.borrow().is_running();
        if !running && envelope != Envelope::FinishShutdown {
            tracing::debug!(?envelope, "Channel shutting down, dropping message");
            return Ok(());
        }

        match envelope {
            Envelope::Empty => {}
            Envelope::Control(ControlMessage::Shutdown) => {
                tracing::info!(channel = self.paths.name(), "Other endpoint requested shutdown");
                self.local_shutdown().await?;
            }
            Envelope::Control(ControlMessage::RemoteShutdown) => self.remote_shutdown().await,
            Envelope::FinishShutdown => {
                tracing::debug!("Received shutdown acknowledgment");
                self.ack_received.store(true, Ordering::Release);
            }
            Envelope::Rejected(name) => {
                tracing::warn!(control = %name, "Rejecting unknown control message");
            }
            Envelope::Application(message) => {
                if !self.callback.dispatch(message) {
                    tracing::debug!("No callback registered, dropping message");
                }
            }
        }
        Ok(())
    }
}

/// Background task: poll, decode, dispatch until stopped.
async fn receive_loop(shared: Arc<Shared>, mut stop: watch::Receiver<bool>) -> Result<()> {
    tracing::debug!(channel = shared.paths.name(), role = %shared.role, "Starting receive loop");
    let mut buf = vec![0u8; shared.config.read_buffer_size.max(1)];

    let outcome: Result<()> = 'poll: loop {
        if *stop.borrow_and_update() {
            break Ok(());
        }

        let items = match shared.poll_read(&mut buf).await {
            Ok(items) => items,
            Err(e) => break Err(e),
        };
        for item in items {
            match item {
                Ok(message) => {
                    if let Err(e) = shared.dispatch(message).await {
                        break 'poll Err(e);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Invalid data received, discarding"),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(shared.config.poll_interval) => {}
            _ = stop.changed() => {}
        }
    };

    match outcome {
        Ok(()) if shared.remote_initiated.load(Ordering::Acquire) => {
            tracing::debug!("Receive loop stopped after remote shutdown");
            Ok(())
        }
        Ok(()) => shared.local_shutdown().await,
        Err(e) => {
            tracing::error!(
                channel = shared.paths.name(),
                role = %shared.role,
                error = %e,
                "Receive loop failed, closing channel"
            );
            shared.abandon().await;
            Err(e)
        }
    }
}
