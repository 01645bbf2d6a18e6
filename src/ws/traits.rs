//! Seams between [`ConnectionManager`](super::ConnectionManager) and the socket transport.

use tokio::sync::mpsc;

use super::connection::{Input, Signal};
use super::error::TransportError;
use crate::Result;

/// Creates sockets for a target.
///
/// [`WsTransport`](super::WsTransport) is the tokio-tungstenite implementation. Other
/// implementations are mostly useful for tests.
pub trait Transport: Send + Sync + 'static {
    /// Start connecting to `target` and return a handle to the new socket.
    ///
    /// Must not block: the actual connect happens in the background and is reported
    /// through `signals`. Returning an error means no socket was created.
    fn connect(&self, target: &str, signals: Signals) -> Result<Box<dyn Socket>>;
}

/// A live socket handle.
///
/// All operations are best-effort and return immediately. Failures are reported
/// later through the [`Signals`] given to [`Transport::connect`].
pub trait Socket: Send + 'static {
    /// Queue a text frame.
    fn send(&self, text: String);

    /// Queue a PING frame.
    fn ping(&self);

    /// Begin the closing handshake. A `close` signal follows once the socket is down.
    fn close(&self);
}

/// Sink through which a socket reports what happens to it.
///
/// Each sink is bound to the socket it was created for; signals from a socket the
/// manager has already discarded are ignored.
#[derive(Debug, Clone)]
pub struct Signals {
    socket: u64,
    tx: mpsc::UnboundedSender<Input>,
}

impl Signals {
    pub(crate) fn new(socket: u64, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { socket, tx }
    }

    /// The connection is established.
    pub fn open(&self) {
        self.emit(Signal::Open);
    }

    /// A text or binary frame arrived.
    pub fn message(&self, payload: Vec<u8>) {
        self.emit(Signal::Message(payload));
    }

    /// The socket is down, with the WebSocket close code.
    pub fn close(&self, code: u16) {
        self.emit(Signal::Close(code));
    }

    /// Something went wrong. A `close` is expected to follow if the socket cannot continue.
    pub fn error(&self, error: TransportError) {
        self.emit(Signal::Error(error));
    }

    fn emit(&self, signal: Signal) {
        // The manager is gone, nobody is left to notify.
        _ = self.tx.send(Input::Signal {
            socket: self.socket,
            signal,
        });
    }
}
