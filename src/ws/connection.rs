#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};

use super::config::Config;
use super::envelope::{Envelope, OutboundEnvelope, Payload};
use super::error::{TransportError, WsError};
use super::events::{Event, Listeners, contain};
use super::timer::{Timer, TimerKind};
use super::traits::{Signals, Socket, Transport};
use super::transport::WsTransport;
use crate::Result;

/// Broadcast channel capacity for notifications.
const BROADCAST_CAPACITY: usize = 1024;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never opened
    Idle,
    /// Socket created, waiting for the transport to report it open
    Connecting,
    /// Transport reported the socket open
    Open,
    /// Transport reported the socket closed
    Closed,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

/// Everything the driver task processes, in arrival order.
#[derive(Debug)]
pub(crate) enum Input {
    Signal { socket: u64, signal: Signal },
    Tick(TimerKind),
}

#[derive(Debug)]
pub(crate) enum Signal {
    Open,
    Message(Vec<u8>),
    Close(u16),
    Error(TransportError),
}

struct LiveSocket {
    id: u64,
    handle: Box<dyn Socket>,
}

struct Record {
    state: ConnectionState,
    /// Set by `close()`, cleared by `open()`
    intentional_close: bool,
    socket: Option<LiveSocket>,
    next_socket_id: u64,
    heartbeat: Timer,
    watchdog: Timer,
}

impl Record {
    fn is_current(&self, socket: u64) -> bool {
        self.socket.as_ref().is_some_and(|live| live.id == socket)
    }

    fn open_socket(&self) -> Option<&dyn Socket> {
        if !self.state.is_open() {
            return None;
        }
        self.socket.as_ref().map(|live| live.handle.as_ref())
    }
}

struct Inner {
    target: String,
    config: Config,
    transport: Box<dyn Transport>,
    record: Mutex<Record>,
    listeners: RwLock<Listeners>,
    /// Sender half of the driver queue, cloned into every socket's [`Signals`]
    input_tx: mpsc::UnboundedSender<Input>,
    broadcast_tx: broadcast::Sender<Event>,
}

impl Inner {
    // Every critical section leaves the record consistent, so a poisoned lock is still usable.
    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> RwLockReadGuard<'_, Listeners> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners_mut(&self) -> RwLockWriteGuard<'_, Listeners> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one WebSocket connection and keeps it alive.
///
/// The manager holds at most one socket at a time. While the socket is open it
/// pings the peer every [`Config::heartbeat_interval`]. With
/// [`Config::auto_reconnect`] set, a connection that closes without a prior call to
/// [`close`](Self::close) is re-opened by a watchdog that checks every
/// [`Config::reconnect_interval`].
///
/// Transport signals and timer ticks are handled one at a time on a background
/// driver task, which is also where listeners run. Listeners never run while the
/// manager's state is locked, so they may call back into the manager.
///
/// Cloning is cheap and every clone refers to the same connection. Dropping the
/// last clone disarms both timers and closes the socket.
///
/// # Example
///
/// ```ignore
/// let connection = ConnectionManager::new(
///     "wss://example.com/socket",
///     Config::builder().auto_reconnect(true).build(),
/// )?;
///
/// connection
///     .on_open(|| println!("connected"))
///     .on_json(|connection, event, data, _message| {
///         if event == "ping" {
///             _ = connection.event("pong", data, None);
///         }
///     });
///
/// connection.open()?;
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.inner.target)
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager for `target` backed by [`WsTransport`].
    ///
    /// Nothing is connected until [`open`](Self::open) is called. Must be called from
    /// within a tokio runtime.
    pub fn new(target: &str, config: Config) -> Result<Self> {
        Self::with_transport(target, config, WsTransport::default())
    }

    /// Create a manager for `target` backed by a custom [`Transport`].
    pub fn with_transport<T: Transport>(target: &str, config: Config, transport: T) -> Result<Self> {
        let runtime = Handle::try_current().map_err(WsError::NoRuntime)?;
        config.validate()?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let record = Record {
            state: ConnectionState::Idle,
            intentional_close: false,
            socket: None,
            next_socket_id: 0,
            heartbeat: Timer::new(
                TimerKind::Heartbeat,
                config.heartbeat_interval,
                input_tx.clone(),
            ),
            watchdog: Timer::new(
                TimerKind::Watchdog,
                config.reconnect_interval,
                input_tx.clone(),
            ),
        };

        let inner = Arc::new(Inner {
            target: target.to_owned(),
            config,
            transport: Box::new(transport),
            record: Mutex::new(record),
            listeners: RwLock::new(Listeners::default()),
            input_tx,
            broadcast_tx,
        });

        runtime.spawn(drive(Arc::downgrade(&inner), input_rx));

        Ok(Self { inner })
    }

    /// Create a socket for the target.
    ///
    /// Does nothing while a socket is already connecting or open. Clears a previous
    /// intentional close, so a manager closed with [`close`](Self::close) can be opened
    /// again. Timers are armed only once the transport reports the socket open.
    pub fn open(&self) -> Result<()> {
        let mut record = self.inner.record();
        self.open_locked(&mut record)
    }

    fn open_locked(&self, record: &mut Record) -> Result<()> {
        if record.socket.is_some()
            || matches!(
                record.state,
                ConnectionState::Connecting | ConnectionState::Open
            )
        {
            #[cfg(feature = "tracing")]
            tracing::trace!(state = ?record.state, "Connection already active, ignoring open");
            return Ok(());
        }

        record.intentional_close = false;

        let id = record.next_socket_id;
        record.next_socket_id = id.wrapping_add(1);
        let signals = Signals::new(id, self.inner.input_tx.clone());

        let handle = self.inner.transport.connect(&self.inner.target, signals)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = %self.inner.target, socket = id, "Opening WebSocket connection");

        record.state = ConnectionState::Connecting;
        record.socket = Some(LiveSocket { id, handle });
        // Re-armed by the close signal if this socket goes down unintentionally
        record.watchdog.disarm();

        Ok(())
    }

    /// Ask the transport to close the socket.
    ///
    /// The close counts as intentional: neither this close nor a reconnect already
    /// pending will cause the manager to reconnect. The state changes to
    /// [`ConnectionState::Closed`] only once the transport reports the close.
    pub fn close(&self) {
        let mut record = self.inner.record();
        record.intentional_close = true;
        record.watchdog.disarm();

        if let Some(live) = &record.socket {
            #[cfg(feature = "tracing")]
            tracing::debug!(socket = live.id, "Closing WebSocket connection");
            live.handle.close();
        }
    }

    /// Close the connection for good: disarm both timers, discard the socket and
    /// drop every listener.
    ///
    /// No notification is emitted for the discarded socket. The manager can still be
    /// opened again afterwards.
    pub fn dispose(&self) {
        {
            let mut record = self.inner.record();
            record.intentional_close = true;
            record.heartbeat.disarm();
            record.watchdog.disarm();

            if let Some(live) = record.socket.take() {
                live.handle.close();
            }
            if record.state != ConnectionState::Idle {
                record.state = ConnectionState::Closed;
            }
        }

        *self.inner.listeners_mut() = Listeners::default();
    }

    /// Send text verbatim, or a JSON value encoded as text.
    ///
    /// Silently dropped unless the connection is open: nothing is queued for later.
    pub fn send<P: Into<Payload>>(&self, payload: P) -> Result<()> {
        let record = self.inner.record();
        let Some(socket) = record.open_socket() else {
            #[cfg(feature = "tracing")]
            tracing::trace!(state = ?record.state, "Connection not open, dropping outbound message");
            return Ok(());
        };

        socket.send(payload.into().into_text()?);
        Ok(())
    }

    /// Encode `value` as JSON and send it.
    ///
    /// Silently dropped unless the connection is open. Fails with
    /// [`Kind::Serialization`](crate::error::Kind::Serialization) if `value` cannot be
    /// encoded, in which case nothing is sent.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let record = self.inner.record();
        let Some(socket) = record.open_socket() else {
            #[cfg(feature = "tracing")]
            tracing::trace!(state = ?record.state, "Connection not open, dropping outbound message");
            return Ok(());
        };

        socket.send(serde_json::to_string(value)?);
        Ok(())
    }

    /// Send `{"event": name, "message": message, "data": data}`.
    ///
    /// `message` defaults to `name`.
    pub fn event<D: Serialize + ?Sized>(
        &self,
        name: &str,
        data: &D,
        message: Option<&str>,
    ) -> Result<()> {
        self.send_json(&OutboundEnvelope {
            event: name,
            message: message.unwrap_or(name),
            data,
        })
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.record().state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Subscribe to every notification as an [`Event`].
    ///
    /// Each call returns a new independent receiver. Events are broadcast after the
    /// listeners for the same signal have run.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn on_open<F>(&self, handler: F) -> &Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.listeners_mut().open.push(Arc::new(handler));
        self
    }

    /// Called with the raw payload of every inbound frame.
    pub fn on_message<F>(&self, handler: F) -> &Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.inner.listeners_mut().message.push(Arc::new(handler));
        self
    }

    /// Called with every inbound frame as text, whether or not it is an envelope.
    pub fn on_text<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ConnectionManager, &str) + Send + Sync + 'static,
    {
        self.inner.listeners_mut().text.push(Arc::new(handler));
        self
    }

    /// Called with `(manager, event, data, message)` for inbound envelopes.
    pub fn on_json<F>(&self, handler: F) -> &Self
    where
        F: Fn(&ConnectionManager, &str, &Value, &str) + Send + Sync + 'static,
    {
        self.inner.listeners_mut().json.push(Arc::new(handler));
        self
    }

    pub fn on_close<F>(&self, handler: F) -> &Self
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        self.inner.listeners_mut().close.push(Arc::new(handler));
        self
    }

    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.inner.listeners_mut().error.push(Arc::new(handler));
        self
    }

    fn handle_signal(&self, socket: u64, signal: Signal) {
        match signal {
            Signal::Open => self.transport_opened(socket),
            Signal::Message(payload) => self.transport_message(socket, payload),
            Signal::Close(code) => self.transport_closed(socket, code),
            Signal::Error(error) => self.transport_error(socket, error),
        }
    }

    fn transport_opened(&self, socket: u64) {
        {
            let mut record = self.inner.record();
            if !record.is_current(socket) {
                return;
            }
            record.state = ConnectionState::Open;
            record.watchdog.disarm();
            record.heartbeat.arm();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(socket, "WebSocket connection open");

        let handlers = self.inner.listeners().open.clone();
        for handler in handlers {
            contain("open", || handler());
        }
        self.broadcast(Event::Open);
    }

    fn transport_message(&self, socket: u64, payload: Vec<u8>) {
        if !self.inner.record().is_current(socket) {
            return;
        }

        let text = String::from_utf8_lossy(&payload).into_owned();
        #[cfg(feature = "tracing")]
        tracing::trace!(%text, "Received WebSocket message");

        let handlers = self.inner.listeners().message.clone();
        for handler in handlers {
            contain("message", || handler(&payload));
        }
        self.broadcast(Event::Message(payload));

        if let Some(envelope) = Envelope::decode(&text) {
            let handlers = self.inner.listeners().json.clone();
            for handler in handlers {
                contain("json", || {
                    handler(self, &envelope.event, &envelope.data, &envelope.message);
                });
            }
            self.broadcast(Event::Json(envelope));
        }

        let handlers = self.inner.listeners().text.clone();
        for handler in handlers {
            contain("text", || handler(self, &text));
        }
        self.broadcast(Event::Text(text));
    }

    fn transport_closed(&self, socket: u64, code: u16) {
        {
            let mut record = self.inner.record();
            if !record.is_current(socket) {
                return;
            }
            record.state = ConnectionState::Closed;
            record.heartbeat.disarm();
            record.socket = None;

            let reconnect = self.inner.config.auto_reconnect && !record.intentional_close;
            if reconnect {
                record.watchdog.arm();
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(socket, code, reconnect, "WebSocket connection closed");
        }

        let handlers = self.inner.listeners().close.clone();
        for handler in handlers {
            contain("close", || handler(code));
        }
        self.broadcast(Event::Close(code));
    }

    fn transport_error(&self, socket: u64, error: TransportError) {
        if !self.inner.record().is_current(socket) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(socket, %error, "WebSocket transport error");

        let handlers = self.inner.listeners().error.clone();
        for handler in handlers {
            contain("error", || handler(&error));
        }
        self.broadcast(Event::Error(error));
    }

    fn handle_tick(&self, kind: TimerKind) {
        let mut record = self.inner.record();

        match kind {
            TimerKind::Heartbeat => {
                if let Some(socket) = record.open_socket() {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Sending heartbeat PING");
                    socket.ping();
                }
            }
            TimerKind::Watchdog => {
                let reconnect = self.inner.config.auto_reconnect
                    && record.state == ConnectionState::Closed
                    && !record.intentional_close;
                if !reconnect {
                    return;
                }

                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = %self.inner.target, "Reconnecting WebSocket");

                // A failed attempt leaves the watchdog armed for the next tick.
                if let Err(e) = self.open_locked(&mut record) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Unable to reconnect");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                }
            }
        }
    }

    fn broadcast(&self, event: Event) {
        // No receivers is fine
        _ = self.inner.broadcast_tx.send(event);
    }
}

/// Driver loop: applies signals and ticks one at a time until the manager is dropped.
async fn drive(inner: Weak<Inner>, mut inputs: mpsc::UnboundedReceiver<Input>) {
    while let Some(input) = inputs.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = ConnectionManager { inner };

        match input {
            Input::Signal { socket, signal } => manager.handle_signal(socket, signal),
            Input::Tick(kind) => manager.handle_tick(kind),
        }
    }
}
