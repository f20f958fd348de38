//! Owner demo - creates a channel and talks to a peer.
//!
//! Run the owner first, then the peer in another terminal:
//!
//! ```sh
//! cargo run --example owner -- demo
//! cargo run --example peer -- demo
//! ```
//!
//! The owner greets the peer, prints whatever comes back, and shuts the
//! channel down on Ctrl-C or after the peer says goodbye.

use fifo_duplex::Endpoint;
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let name = std::env::args().nth(1).unwrap_or_else(|| "demo".to_string());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let owner = Endpoint::owner_builder()
        .callback(move |msg| {
            println!("owner received: {msg}");
            let _ = tx.send(msg);
        })
        .interrupt_on(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .initialize(&name)
        .await?;

    owner.write(&json!({"greet": "hello from the owner"})).await?;

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if msg.get("bye").is_some() {
                    break;
                }
            }
            _ = owner.closed() => {
                println!("peer closed the channel");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    owner.shutdown().await?;
    owner.shutdown_channel().await?;
    Ok(())
}
