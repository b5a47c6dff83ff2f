//! # Rate Limiter Module
//!
//! Fixed-window cooldown between two accepted requests from the same user.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Outcome of a cooldown check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Whole seconds left before the next request is accepted (0 when allowed)
    pub wait_seconds: u64,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            wait_seconds: 0,
        }
    }
}

/// Per-user cooldown limiter
///
/// Keeps the timestamp of the last accepted request for every user. A
/// request is rejected while less than `cooldown` has elapsed since that
/// timestamp; a rejection does not move the timestamp.
///
/// Entries are never evicted: the map grows with the number of distinct
/// users seen during the process lifetime.
#[derive(Debug)]
pub struct RateLimiter {
    last_accepted: Mutex<HashMap<u64, Instant>>,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_accepted: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check `user_id` against the cooldown at time `now`, recording `now`
    /// as the last accepted request when allowed.
    pub fn check(&self, user_id: u64, now: Instant) -> RateLimitDecision {
        let mut last_accepted = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(last) = last_accepted.get(&user_id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.cooldown {
                let remaining = self.cooldown - elapsed;
                return RateLimitDecision {
                    allowed: false,
                    wait_seconds: remaining.as_secs(),
                };
            }
        }

        last_accepted.insert(user_id, now);
        RateLimitDecision::allow()
    }

    /// Check against the current instant
    pub fn check_now(&self, user_id: u64) -> RateLimitDecision {
        self.check(user_id, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_allowed() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let decision = limiter.check(1, Instant::now());
        assert!(decision.allowed);
        assert_eq!(decision.wait_seconds, 0);
    }

    #[test]
    fn test_rejection_rounds_down() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check(1, start).allowed);

        let decision = limiter.check(1, start + Duration::from_millis(3_400));
        assert!(!decision.allowed);
        assert_eq!(decision.wait_seconds, 6);
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.check(1, start).allowed);
        assert!(limiter.check(2, start + Duration::from_secs(1)).allowed);
        assert!(!limiter.check(1, start + Duration::from_secs(1)).allowed);
    }

    #[test]
    fn test_zero_cooldown_never_rejects() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let now = Instant::now();
        assert!(limiter.check(1, now).allowed);
        assert!(limiter.check(1, now).allowed);
    }
}
