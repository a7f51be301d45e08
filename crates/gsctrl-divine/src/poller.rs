//! Periodic config poll.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Default period between config requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Repeating poll timer. The first tick comes one full period after
/// [`start`](Poller::start).
#[derive(Debug)]
pub struct Poller {
    period: Duration,
    interval: Option<Interval>,
}

impl Poller {
    pub fn new(period: Duration) -> Self {
        Poller {
            period,
            interval: None,
        }
    }

    /// Start ticking, replacing any running timer.
    pub fn start(&mut self) {
        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub fn stop(&mut self) {
        self.interval = None;
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Resolve on the next tick. Pending forever while stopped.
    pub async fn tick(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_after_start() {
        let mut poller = Poller::new(Duration::from_secs(5));
        let start = Instant::now();
        poller.start();
        poller.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        poller.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_poller_never_ticks() {
        let mut poller = Poller::new(Duration::from_secs(5));
        assert!(!poller.is_running());
        let ticked = tokio::time::timeout(Duration::from_secs(30), poller.tick()).await;
        assert!(ticked.is_err());

        poller.start();
        assert!(poller.is_running());
        poller.stop();
        let ticked = tokio::time::timeout(Duration::from_secs(30), poller.tick()).await;
        assert!(ticked.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_phase() {
        let mut poller = Poller::new(Duration::from_secs(5));
        poller.start();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let restarted = Instant::now();
        poller.start();
        poller.tick().await;
        assert_eq!(restarted.elapsed(), Duration::from_secs(5));
        assert_eq!(poller.period(), Duration::from_secs(5));
    }
}
