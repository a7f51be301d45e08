//! Data watchdog: a single-shot timer re-armed by every inbound datagram.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep};

/// Default time without data before the link is declared failed.
pub const DEFAULT_DATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Single-shot liveness timer.
///
/// [`expired`](Watchdog::expired) is cancel-safe and meant to sit in a
/// `select!` loop: it stays pending while disarmed and resolves once per
/// arming.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Watchdog {
            timeout,
            deadline: None,
        }
    }

    /// Configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start the timer, or restart it from now if already running.
    pub fn arm(&mut self) {
        let at = Instant::now() + self.timeout;
        match &mut self.deadline {
            Some(deadline) => deadline.as_mut().reset(at),
            None => self.deadline = Some(Box::pin(sleep(self.timeout))),
        }
    }

    /// Stop the timer without firing.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolve when the armed timer fires. Disarms on completion.
    pub async fn expired(&mut self) {
        match &mut self.deadline {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending().await,
        }
    }
}
