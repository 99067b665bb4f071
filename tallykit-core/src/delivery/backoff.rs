use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

/// Smallest base delay; a zero base would never grow.
const MIN_BASE: Duration = Duration::from_millis(1);

/// Inter-event delay of the delivery loop.
///
/// Starts at the base delay, doubles on every failed attempt up to the ceiling and snaps back
/// to the base after a success.
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    current: Duration,
    schedule: ExponentialBackoff,
}

impl Backoff {
    /// Creates a backoff starting at `base` (at least 1 ms) and capped at `ceiling`.
    #[must_use]
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        let base = base.max(MIN_BASE);
        let ceiling = ceiling.max(base);
        Self {
            base,
            ceiling,
            current: base,
            schedule: schedule(base, ceiling),
        }
    }

    /// Delay to wait before the next attempt.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Records a failed attempt and returns the new delay.
    pub fn record_failure(&mut self) -> Duration {
        let next = self.schedule.next().unwrap_or(self.ceiling);
        self.current = next.min(self.ceiling).max(self.current);
        self.current
    }

    /// Records a successful attempt, resetting the delay to the base.
    pub fn record_success(&mut self) {
        self.current = self.base;
        self.schedule = schedule(self.base, self.ceiling);
    }
}

/// Delays after the first, second, ... consecutive failure: `2 * base`, `4 * base`, ...
fn schedule(base: Duration, ceiling: Duration) -> ExponentialBackoff {
    ExponentialBuilder::default()
        .with_min_delay(base.saturating_mul(2).min(ceiling))
        .with_max_delay(ceiling)
        .with_factor(2.0)
        .with_max_times(usize::MAX)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_up_to_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(32));
        assert_eq!(backoff.current(), Duration::from_secs(1));

        let delays: Vec<u64> = (0..8).map(|_| backoff.record_failure().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 32, 32, 32]);
    }

    #[test]
    fn test_monotonic_and_bounded() {
        let mut backoff = Backoff::new(Duration::from_millis(300), Duration::from_millis(5_000));
        let mut previous = backoff.current();
        for _ in 0..50 {
            let next = backoff.record_failure();
            assert!(next >= previous);
            assert!(next <= Duration::from_millis(5_000));
            previous = next;
        }
        assert_eq!(previous, Duration::from_millis(5_000));
    }

    #[test]
    fn test_success_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(32));
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        assert_eq!(backoff.current(), Duration::from_secs(1));
        assert_eq!(backoff.record_failure(), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_base_still_grows() {
        let mut backoff = Backoff::new(Duration::ZERO, Duration::from_secs(32));
        assert_eq!(backoff.current(), Duration::from_millis(1));

        let delays: Vec<u128> = (0..5).map(|_| backoff.record_failure().as_millis()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_base_above_ceiling_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(backoff.current(), Duration::from_secs(10));
        assert_eq!(backoff.record_failure(), Duration::from_secs(10));
    }
}
