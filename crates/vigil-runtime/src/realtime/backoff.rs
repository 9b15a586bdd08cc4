//! Reconnect schedule.

use std::time::Duration;

/// Bounded exponential backoff: `base * 2^attempt`, capped at `max`.
///
/// ```
/// use std::time::Duration;
/// use vigil_runtime::realtime::Backoff;
///
/// let b = Backoff::new(Duration::from_millis(500), Duration::from_secs(4));
/// assert_eq!(b.delay(0), Duration::from_millis(500));
/// assert_eq!(b.delay(2), Duration::from_secs(2));
/// assert_eq!(b.delay(10), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
}

impl Backoff {
    /// Unbounded schedule from `base` up to `max`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            max_attempts: None,
        }
    }

    /// Limits consecutive reconnect attempts. `0` means unbounded.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = (attempts > 0).then_some(attempts);
        self
    }

    /// Attempt limit, if any.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether reconnect attempt number `attempt` (1-based) may run.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Delay before the reconnect following `attempt` prior failures.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let cap_ms = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(cap_ms))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let b = Backoff::default();
        let delays: Vec<u64> = (0..8)
            .map(|n| u64::try_from(b.delay(n).as_millis()).expect("fits"))
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 16000, 30000, 30000]);
    }

    #[test]
    fn huge_attempt_saturates() {
        let b = Backoff::default();
        assert_eq!(b.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn zero_attempts_is_unbounded() {
        let b = Backoff::default().with_max_attempts(0);
        assert_eq!(b.max_attempts(), None);
        assert!(b.allows(1_000_000));
    }

    #[test]
    fn bounded_attempts() {
        let b = Backoff::default().with_max_attempts(2);
        assert!(b.allows(1));
        assert!(b.allows(2));
        assert!(!b.allows(3));
    }

    #[test]
    fn cap_below_base_is_raised_to_base() {
        let b = Backoff::new(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(b.delay(3), Duration::from_secs(2));
    }
}
