use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::connection::Input;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Heartbeat,
    Watchdog,
}

/// A recurring timer owned by the connection manager.
///
/// Ticks are not acted on here: they are queued as [`Input::Tick`] so they are
/// handled in order with transport signals. The first tick fires one `period`
/// after arming. Dropping the timer disarms it.
#[derive(Debug)]
pub(crate) struct Timer {
    kind: TimerKind,
    period: Duration,
    tx: mpsc::UnboundedSender<Input>,
    token: Option<CancellationToken>,
}

impl Timer {
    pub(crate) fn new(kind: TimerKind, period: Duration, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self {
            kind,
            period,
            tx,
            token: None,
        }
    }

    /// Start ticking. No-op while already armed.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn arm(&mut self) {
        if self.is_armed() {
            return;
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();
        let kind = self.kind;
        let period = self.period;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(Input::Tick(kind)).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.token = Some(token);
    }

    pub(crate) fn disarm(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.token.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.disarm();
    }
}
