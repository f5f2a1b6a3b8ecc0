//! Backoff policy for panel action re-attempts.

use std::time::Duration;

/// Maximum backoff between re-attempts (60 seconds).
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Default first backoff delay (1 second).
const DEFAULT_BASE: Duration = Duration::from_secs(1);

/// Capped exponential backoff for a bounded number of re-attempts.
///
/// Delays double from the base and are strictly increasing until the cap:
/// 1s, 2s, 4s, 8s, 16s, 32s, then 60s. Re-attempts are scheduled as timer
/// messages by the controller, never slept out inline, so no worker waits
/// out a backoff window.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts allowed for one action, including the first
    pub cap: u32,
    /// Delay before the first re-attempt; doubles from here
    pub base: Duration,
}

impl RetryPolicy {
    pub fn new(cap: u32) -> Self {
        Self::with_base(cap, DEFAULT_BASE)
    }

    pub fn with_base(cap: u32, base: Duration) -> Self {
        Self {
            cap: cap.max(1),
            base,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.cap
    }

    /// Delay before re-attempt number `attempt + 1`, given `attempt` failures
    /// so far (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(6);
        (self.base * 2u32.pow(exponent)).min(MAX_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_strictly_increase_until_cap() {
        let policy = RetryPolicy::new(10);
        let mut previous = Duration::ZERO;
        for attempt in 1..=6 {
            let delay = policy.delay_for(attempt);
            assert!(
                delay > previous,
                "attempt {} delay {:?} not greater than {:?}",
                attempt,
                delay,
                previous
            );
            previous = delay;
        }
        // Capped from the seventh failure onward
        assert_eq!(policy.delay_for(7), Duration::from_secs(60));
        assert_eq!(policy.delay_for(20), Duration::from_secs(60));
    }

    #[test]
    fn base_scales_the_sequence() {
        let policy = RetryPolicy::with_base(5, Duration::from_millis(20));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for(3), Duration::from_millis(80));
    }

    #[test]
    fn cap_bounds_attempts() {
        let policy = RetryPolicy::new(5);
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(4));
        assert!(!policy.allows_retry(5));
        assert!(!policy.allows_retry(6));
    }

    #[test]
    fn zero_cap_still_allows_one_attempt() {
        let policy = RetryPolicy::new(0);
        assert_eq!(policy.cap, 1);
        assert!(!policy.allows_retry(1));
    }
}
