//! [`Transport`] backed by tokio-tungstenite.

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as TungsteniteError, Message};
use url::Url;

use super::error::{TransportError, WsError};
use super::traits::{Signals, Socket, Transport};
use crate::Result;

/// Close code reported for a close frame that carried no status.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code reported when the connection ended without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// How long the peer has to answer a close frame before the connection is dropped.
pub const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connects to `ws://` and `wss://` targets.
///
/// Each socket is served by its own background task. The handle returned from
/// [`connect`](Transport::connect) only queues commands for that task, and dropping
/// it closes the connection.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn connect(&self, target: &str, signals: Signals) -> Result<Box<dyn Socket>> {
        let url = Url::parse(target).map_err(WsError::InvalidTarget)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(WsError::UnsupportedScheme(url.scheme().to_owned()).into());
        }
        let runtime = Handle::try_current().map_err(WsError::NoRuntime)?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        runtime.spawn(run(url, commands_rx, signals));

        Ok(Box::new(WsSocket { commands_tx }))
    }
}

#[derive(Debug)]
enum Command {
    Text(String),
    Ping,
    Close,
}

#[derive(Debug)]
struct WsSocket {
    commands_tx: mpsc::UnboundedSender<Command>,
}

impl WsSocket {
    fn queue(&self, command: Command) {
        // The socket task already finished and reported its close
        _ = self.commands_tx.send(command);
    }
}

impl Socket for WsSocket {
    fn send(&self, text: String) {
        self.queue(Command::Text(text));
    }

    fn ping(&self) {
        self.queue(Command::Ping);
    }

    fn close(&self) {
        self.queue(Command::Close);
    }
}

/// Resolves once a close is requested or the handle is dropped.
async fn close_requested(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        if matches!(command, Command::Close) {
            return;
        }
    }
}

/// Socket task: connect, then pump frames both ways until the connection ends.
async fn run(url: Url, mut commands: mpsc::UnboundedReceiver<Command>, signals: Signals) {
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        () = close_requested(&mut commands) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%url, "Close requested while connecting");
            signals.close(ABNORMAL_CLOSURE);
            return;
        }
    };

    let stream = match connected {
        Ok((stream, _)) => stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%url, error = %e, "Unable to connect");
            signals.error(TransportError::with_source("Unable to connect", e));
            signals.close(ABNORMAL_CLOSURE);
            return;
        }
    };

    signals.open();

    let (mut write, mut read) = stream.split();
    let mut code = None;
    // Once set, nothing but the close frame is written and the peer has until
    // `close_deadline` to finish the handshake.
    let mut closing = false;
    let mut close_deadline = Instant::now();
    let mut handle_alive = true;

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => signals.message(text.as_bytes().to_vec()),
                    Some(Ok(Message::Binary(data))) => signals.message(data.to_vec()),
                    Some(Ok(Message::Close(frame))) => {
                        // tungstenite answers the peer's close frame itself
                        code = Some(frame.map_or(NO_STATUS_RECEIVED, |frame| u16::from(frame.code)));
                        if !closing {
                            closing = true;
                            close_deadline = Instant::now() + CLOSE_HANDSHAKE_TIMEOUT;
                        }
                    }
                    Some(Ok(_)) => {
                        // PING/PONG are answered by tungstenite itself
                    }
                    Some(Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed))
                    | None => break,
                    Some(Err(e)) => {
                        signals.error(TransportError::with_source("WebSocket read failed", e));
                        break;
                    }
                }
            }

            () = time::sleep_until(close_deadline), if closing => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%url, "Close handshake timed out");
                break;
            }

            command = commands.recv(), if handle_alive => {
                let message = match command {
                    None => {
                        handle_alive = false;
                        if closing {
                            continue;
                        }
                        close_frame()
                    }
                    // Nothing is written after a close frame in either direction
                    Some(_) if closing => continue,
                    Some(Command::Text(text)) => Message::Text(text.into()),
                    Some(Command::Ping) => Message::Ping(Vec::new().into()),
                    Some(Command::Close) => close_frame(),
                };

                let written = if matches!(message, Message::Close(_)) {
                    closing = true;
                    close_deadline = Instant::now() + CLOSE_HANDSHAKE_TIMEOUT;
                    match time::timeout_at(close_deadline, write.send(message)).await {
                        Ok(written) => written,
                        Err(_) => break,
                    }
                } else {
                    write.send(message).await
                };

                if let Err(e) = written {
                    signals.error(TransportError::with_source("WebSocket write failed", e));
                    break;
                }
            }
        }
    }

    signals.close(code.unwrap_or(ABNORMAL_CLOSURE));
}

fn close_frame() -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }))
}
