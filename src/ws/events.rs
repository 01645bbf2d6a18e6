//! Application-facing notifications.
//!
//! Listeners registered per signal run synchronously on the manager's driver task,
//! in registration order. A panicking listener is logged and skipped; it never
//! leaves the manager in a half-updated state because state changes are committed
//! before any listener runs.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde_json::Value;

use super::ConnectionManager;
use super::envelope::Envelope;
use super::error::TransportError;

pub type OpenHandler = Arc<dyn Fn() + Send + Sync>;

pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Receives the manager and the frame as text, for every inbound frame.
pub type TextHandler = Arc<dyn Fn(&ConnectionManager, &str) + Send + Sync>;

/// Receives the manager, `event`, `data` and `message` of an inbound envelope.
pub type JsonHandler = Arc<dyn Fn(&ConnectionManager, &str, &Value, &str) + Send + Sync>;

pub type CloseHandler = Arc<dyn Fn(u16) + Send + Sync>;

pub type ErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// A notification, as delivered to [`subscribe`](ConnectionManager::subscribe) receivers.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    Open,
    /// Raw payload of an inbound frame
    Message(Vec<u8>),
    /// Inbound frame that decoded as an envelope
    Json(Envelope),
    /// Every inbound frame, as text
    Text(String),
    /// Close code
    Close(u16),
    Error(TransportError),
}

#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) open: Vec<OpenHandler>,
    pub(crate) message: Vec<MessageHandler>,
    pub(crate) text: Vec<TextHandler>,
    pub(crate) json: Vec<JsonHandler>,
    pub(crate) close: Vec<CloseHandler>,
    pub(crate) error: Vec<ErrorHandler>,
}

/// Run one listener, swallowing its panic.
pub(crate) fn contain<F: FnOnce()>(signal: &'static str, handler: F) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(handler)) {
        let reason = panic_message(panic.as_ref());
        #[cfg(feature = "tracing")]
        tracing::warn!(signal, %reason, "Event listener panicked");
        #[cfg(not(feature = "tracing"))]
        let _ = (signal, reason);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
