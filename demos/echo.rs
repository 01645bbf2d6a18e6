//! Connects to an echo server, sends a few envelopes and logs everything that comes back.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=debug cargo run --example echo --features tracing -- wss://ws.postman-echo.com/raw
//! ```

use std::time::Duration;

use resilient_ws_client::{Config, ConnectionManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TARGET: &str = "wss://ws.postman-echo.com/raw";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_TARGET.to_owned());

    let config = Config::builder()
        .auto_reconnect(true)
        .heartbeat_interval(Duration::from_secs(5))
        .build();
    let connection = ConnectionManager::new(&target, config)?;

    connection
        .on_open(|| info!(signal = "open"))
        .on_json(|_, event, data, message| info!(signal = "json", event, %data, message))
        .on_text(|_, text| info!(signal = "text", text))
        .on_close(|code| info!(signal = "close", code))
        .on_error(|error| warn!(signal = "error", %error));

    let mut events = connection.subscribe();
    connection.open()?;

    // Wait for the socket before sending, sends are dropped until then.
    while let Ok(event) = events.recv().await {
        if matches!(event, resilient_ws_client::Event::Open) {
            break;
        }
    }

    connection.send("hello")?;
    for seq in 0..3 {
        connection.event("tick", &seq, None)?;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    connection.close();
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!(state = ?connection.state());

    Ok(())
}
