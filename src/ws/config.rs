use std::time::Duration;

use bon::Builder;

use crate::Result;
use crate::error::Error;

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_INTERVAL_DURATION: Duration = Duration::from_secs(2);

/// Configuration for [`ConnectionManager`](super::ConnectionManager) behavior.
///
/// ```
/// use std::time::Duration;
///
/// use resilient_ws_client::ws::Config;
///
/// let config = Config::builder()
///     .auto_reconnect(true)
///     .reconnect_interval(Duration::from_secs(5))
///     .build();
///
/// assert!(config.auto_reconnect);
/// assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Re-open the connection after every close that was not requested through
    /// [`close`](super::ConnectionManager::close). Off by default.
    #[builder(default)]
    pub auto_reconnect: bool,
    /// Interval for sending PING frames while the connection is open
    #[builder(default = DEFAULT_HEARTBEAT_INTERVAL_DURATION)]
    pub heartbeat_interval: Duration,
    /// Interval at which a closed connection checks whether it should reconnect
    #[builder(default = DEFAULT_RECONNECT_INTERVAL_DURATION)]
    pub reconnect_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Timer periods must be non-zero, `tokio::time::interval` panics otherwise.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::validation("heartbeat_interval must be non-zero"));
        }
        if self.reconnect_interval.is_zero() {
            return Err(Error::validation("reconnect_interval must be non-zero"));
        }

        Ok(())
    }
}
