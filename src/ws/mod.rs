//! Resilient WebSocket connection management.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns one socket at a time, keeps it alive with heartbeats and
//!   re-opens it after unintentional closes
//! - [`Transport`] / [`Socket`]: the seam to the socket implementation, with
//!   [`WsTransport`] as the tokio-tungstenite default
//! - [`Envelope`]: the `{event, message, data}` convention used for structured messages
//!
//! # Example
//!
//! ```ignore
//! let connection = ConnectionManager::new("wss://example.com/socket", Config::default())?;
//!
//! let mut events = connection.subscribe();
//! connection.open()?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let Event::Json(envelope) = event {
//!         println!("{}: {}", envelope.event, envelope.data);
//!     }
//! }
//! ```

pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod events;
mod timer;
pub mod traits;
pub mod transport;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
pub use envelope::{Envelope, Payload};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::{TransportError, WsError};
pub use events::Event;
pub use traits::*;
pub use transport::WsTransport;
