// src/task/retry.rs

//! Per-task retry policy.

use std::time::Duration;

use crate::types::BackoffKind;

/// Delay between two attempts of the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `initial * 2^(attempt-1)`, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// How often a task may be tried and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three retries, five minutes apart.
    fn default() -> Self {
        Self::fixed(4, Duration::from_secs(300))
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { initial, max },
        }
    }

    pub fn from_parts(
        max_attempts: u32,
        kind: BackoffKind,
        delay: Duration,
        max_delay: Duration,
    ) -> Self {
        match kind {
            BackoffKind::Fixed => Self::fixed(max_attempts, delay),
            BackoffKind::Exponential => Self::exponential(max_attempts, delay, max_delay),
        }
    }

    /// Delay to wait after `attempt` (1-indexed) failed, or `None` when that
    /// was the last permitted attempt.
    pub fn delay_after_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }

        match self.backoff {
            Backoff::Fixed(delay) => Some(delay),
            Backoff::Exponential { initial, max } => {
                let multiplier = 2u32.saturating_pow(attempt - 1);
                Some(initial.saturating_mul(multiplier).min(max))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_never_retries() {
        assert_eq!(RetryPolicy::once().delay_after_attempt(1), None);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::from_secs(1)).max_attempts, 1);
    }

    #[test]
    fn fixed_policy_counts_total_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        assert_eq!(policy.delay_after_attempt(1), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_after_attempt(2), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_after_attempt(3), None);
    }

    #[test]
    fn exponential_doubles_and_caps() {
        let policy =
            RetryPolicy::exponential(10, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(policy.delay_after_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_after_attempt(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after_attempt(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_after_attempt(7), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_after_attempt(10), None);
    }

    #[test]
    fn default_matches_three_retries_five_minutes_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_after_attempt(3), Some(Duration::from_secs(300)));
        assert_eq!(policy.delay_after_attempt(4), None);
    }
}
