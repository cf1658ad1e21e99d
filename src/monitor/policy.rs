//! Reconnect policy
//!
//! Fixed delay, no backoff, no attempt ceiling.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay between a close and the next connection attempt
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before attempt number `attempt`. Constant for every attempt.
    pub fn delay_for(&self, _attempt: u64) -> Duration {
        self.delay
    }

    /// Whether attempt number `attempt` should be made at all. Always true.
    pub fn should_retry(&self, _attempt: u64) -> bool {
        true
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backoff_no_ceiling() {
        let policy = ReconnectPolicy::default();
        for attempt in [1, 2, 10, 10_000, u64::MAX] {
            assert!(policy.should_retry(attempt));
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(3));
        }
    }
}
