//! # fifo-duplex
//!
//! Bidirectional JSON message channel between two local processes, built
//! on a pair of unidirectional named pipes (FIFOs).
//!
//! ## Architecture
//!
//! - **Owner** endpoint: creates `/tmp/<name>`, waits for the peer, and
//!   removes both pipe files when the channel closes
//! - **Peer** endpoint: creates `/tmp/<name>-reverse`, connects to the
//!   owner, never removes pipe files once connected
//! - Each endpoint runs a background receive loop that decodes inbound
//!   JSON and either handles it as a control message or passes it to the
//!   application callback
//!
//! ## Example
//!
//! ```ignore
//! use fifo_duplex::Endpoint;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> fifo_duplex::Result<()> {
//!     let peer = Endpoint::peer_builder()
//!         .callback(|msg| println!("peer got {msg}"))
//!         .initialize("chan")
//!         .await?;
//!
//!     peer.write(&json!({"greet": "hi"})).await?;
//!
//!     // Wait for the owner to close the channel.
//!     peer.closed().await;
//!     peer.shutdown_channel().await
//! }
//! ```

#[cfg(not(unix))]
compile_error!("fifo-duplex requires a Unix platform with named pipe support");

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod shutdown;
pub mod transport;

mod endpoint;

pub use config::ChannelConfig;
pub use endpoint::{Endpoint, EndpointBuilder};
pub use error::{ChannelError, Result};
pub use protocol::ControlMessage;
pub use shutdown::{Role, ShutdownState};
