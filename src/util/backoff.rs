//! Exponential back-off for accept loops.
//!
//! A listener that keeps failing to accept (e.g. out of file descriptors)
//! sleeps a little longer after each consecutive failure instead of spinning.

use std::time::Duration;
use tokio::time::sleep;

/// Smallest first step when back-off is enabled, so doubling makes progress.
const MIN_STEP: Duration = Duration::from_millis(1);

/// Doubling delay between `min` and `max`, reset after a success.
#[derive(Debug, Clone)]
pub struct AcceptBackoff {
    min: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl AcceptBackoff {
    /// A zero `max` disables sleeping. Otherwise `min` is raised to at least
    /// 1ms and capped at `max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = if max.is_zero() {
            Duration::ZERO
        } else {
            min.max(MIN_STEP).min(max)
        };
        Self {
            min,
            max,
            current: None,
        }
    }

    /// Delay the next call to `snooze` will sleep for.
    pub fn next_delay(&self) -> Duration {
        match self.current {
            None => self.min,
            Some(d) => d.saturating_mul(2).min(self.max),
        }
    }

    /// Sleep for the next step and grow the delay.
    pub async fn snooze(&mut self) {
        let delay = self.next_delay();
        self.current = Some(delay);
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(5), Duration::from_secs(1))
    }
}
