use std::time::Duration;
use tracing::debug;

/// Exponential reconnect backoff for a single camera.
///
/// The first failure waits `base_delay`, each consecutive failure doubles the
/// wait up to `max_delay`. A successful frame read resets it.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base_delay: Duration,
    max_delay: Duration,
    consecutive_failures: u32,
}

impl ReconnectBackoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            consecutive_failures: 0,
        }
    }

    /// Delay to wait before the next attempt; records one more failure
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.calculate_delay(self.consecutive_failures);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        debug!(
            "Reconnect backoff: failure #{} -> waiting {:?}",
            self.consecutive_failures, delay
        );
        delay
    }

    /// Delay the next call to `next_delay` will return
    pub fn current_delay(&self) -> Duration {
        self.calculate_delay(self.consecutive_failures)
    }

    pub fn reset(&mut self) {
        if self.consecutive_failures > 0 {
            debug!(
                "Reconnect backoff reset after {} failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn calculate_delay(&self, failures: u32) -> Duration {
        // 2^31 already dwarfs any sensible ceiling
        let factor = 2u32.saturating_pow(failures.min(31));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        let mut backoff = ReconnectBackoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff.consecutive_failures(), 7);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = ReconnectBackoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.current_delay(), Duration::from_secs(8));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_saturates() {
        let mut backoff =
            ReconnectBackoff::new(Duration::from_millis(10), Duration::from_millis(50));
        for _ in 0..100 {
            assert!(backoff.next_delay() <= Duration::from_millis(50));
        }
        assert_eq!(backoff.current_delay(), Duration::from_millis(50));
    }
}
