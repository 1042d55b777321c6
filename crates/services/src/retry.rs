use std::time::Duration;

/// Bounded exponential backoff between compare-and-swap attempts.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = if max_delay.is_zero() {
            None
        } else {
            Some(max_delay)
        };
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn handle(&self) -> RetryHandle {
        RetryHandle {
            policy: self.clone(),
            attempts: 0,
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = attempt.saturating_sub(1).min(31);
        let factor = 1u128 << shift;
        let scaled = self.base_delay.as_millis().saturating_mul(factor);
        let raw = Duration::from_millis(scaled.min(u128::from(u64::MAX)) as u64);
        match self.max_delay {
            Some(max) => raw.min(max),
            None => raw,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_millis(100)).with_max_delay(Duration::from_secs(2))
    }
}

/// Tracks one operation's progress through its policy.
pub struct RetryHandle {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryHandle {
    /// Delay before the next attempt, or `None` once the attempt budget is
    /// spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts + 1 >= self.policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay_for_attempt(self.attempts))
    }

    /// Retries taken so far (the first attempt is not a retry).
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_capped() {
        let policy = RetryPolicy::exponential(6, Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));
        let mut handle = policy.handle();
        let delays: Vec<_> = std::iter::from_fn(|| handle.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    #[test]
    fn single_attempt_never_retries() {
        let mut handle = RetryPolicy::exponential(0, Duration::from_millis(5)).handle();
        assert_eq!(handle.next_delay(), None);
        assert_eq!(handle.attempts(), 0);
    }
}
