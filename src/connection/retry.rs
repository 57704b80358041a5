use std::time::Duration;

/// How often and how patiently the connection manager tries to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const MAX_ATTEMPTS: u32 = 10;
    pub const DELAY: Duration = Duration::from_secs(1);

    /// A budget of zero is raised to one attempt.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A fresh budget for one `connect`.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: *self,
            attempts: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::MAX_ATTEMPTS, Self::DELAY)
    }
}

/// Attempt counter for one connect sequence.
///
/// `next_attempt` hands out attempt numbers `1..=max_attempts` and `None`
/// once the budget is spent. The caller waits `delay()` after each failed
/// attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn next_attempt(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.policy.delay
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }
}
