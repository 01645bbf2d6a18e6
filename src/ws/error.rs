#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tokio::runtime::TryCurrentError;

/// Failures raised synchronously while creating a socket.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// The target could not be parsed as a URL
    InvalidTarget(url::ParseError),
    /// The target parsed, but its scheme is not `ws` or `wss`
    UnsupportedScheme(String),
    /// No tokio runtime is available to drive the connection
    NoRuntime(TryCurrentError),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget(e) => write!(f, "Invalid WebSocket target: {e}"),
            Self::UnsupportedScheme(scheme) => {
                write!(f, "Unsupported WebSocket scheme: {scheme}")
            }
            Self::NoRuntime(e) => write!(f, "WebSocket connection requires a runtime: {e}"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::InvalidTarget(e) => Some(e),
            Self::NoRuntime(e) => Some(e),
            Self::UnsupportedScheme(_) => None,
        }
    }
}

impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Connection, e)
    }
}

/// A failure reported by the transport after the socket was created.
///
/// Delivered to `error` listeners and never returned from a manager method.
/// Cheap to clone so the same value can reach every listener.
#[derive(Debug, Clone)]
pub struct TransportError {
    message: String,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    #[must_use]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{}: {}", self.message, src),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Kind};

    #[test]
    fn ws_error_into_error_is_connection_kind() {
        let error: Error = WsError::UnsupportedScheme("http".to_owned()).into();

        assert_eq!(error.kind(), Kind::Connection);
        assert_eq!(
            error.to_string(),
            "Connection: Unsupported WebSocket scheme: http"
        );
    }

    #[test]
    fn transport_error_display_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let error = TransportError::with_source("read failed", io);

        assert_eq!(error.message(), "read failed");
        assert_eq!(error.to_string(), "read failed: reset by peer");
        assert!(error.source().is_some(), "source should be exposed");
    }
}
