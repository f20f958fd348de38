//! Peer demo - connects to a running owner.
//!
//! Answers the owner's greeting, counts to three, says goodbye, then waits
//! for the owner to close the channel.

use std::time::Duration;

use fifo_duplex::Endpoint;
use serde_json::json;
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

    let peer = Endpoint::peer_builder()
        .callback(|msg| println!("peer received: {msg}"))
        .connect_timeout(Duration::from_secs(30))
        .interrupt_on(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .initialize(&name)
        .await?;

    for n in 1..=3 {
        peer.write(&json!({ "count": n })).await?;
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    peer.write(&json!({"bye": true})).await?;

    peer.closed().await;
    peer.shutdown_channel().await?;
    Ok(())
}
