//! Rate limiting utilities

use dashmap::DashMap;
use governor::{clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter};
use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Keyed rate limiter type alias (one GCRA cell per agent)
pub type AgentLimiter = RateLimiter<Uuid, DefaultKeyedStateStore<Uuid>, DefaultClock>;

/// Create a per-agent limiter with the specified requests per second
pub fn create_agent_limiter(requests_per_second: u32) -> Arc<AgentLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::keyed(quota))
}

/// Join endpoint rate limit
pub const JOIN_RATE_LIMIT: u32 = 2; // Max 2 join attempts per second per agent

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

/// Per-entity action limiter: at most `max_actions` accepted in any rolling
/// `window`. Each entity keeps a log of its accepted timestamps; rejected
/// submissions are never logged.
pub struct ActionLimiter {
    max_actions: u32,
    window: Duration,
    buckets: DashMap<Uuid, VecDeque<Instant>>,
}

impl ActionLimiter {
    pub fn new(max_actions: u32, window: Duration) -> Self {
        Self {
            max_actions: max_actions.max(1),
            window,
            buckets: DashMap::new(),
        }
    }

    /// Count one submission for `entity_id` at `now`
    pub fn check(&self, entity_id: Uuid, now: Instant) -> LimitDecision {
        let mut log = self.buckets.entry(entity_id).or_default();

        while log
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window)
        {
            log.pop_front();
        }

        if log.len() < self.max_actions as usize {
            log.push_back(now);
            return LimitDecision::Allowed;
        }

        // The oldest logged action leaves the window first
        let retry_after = log
            .front()
            .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
            .unwrap_or_default();
        LimitDecision::Limited { retry_after }
    }

    /// Drop entities with nothing left in the window at `now`
    pub fn prune(&self, now: Instant) {
        let window = self.window;
        self.buckets.retain(|_, log| {
            log.back()
                .is_some_and(|&t| now.saturating_duration_since(t) < window)
        });
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n_plus_one_is_limited_within_window() {
        let limiter = ActionLimiter::new(5, Duration::from_secs(1));
        let id = Uuid::new_v4();
        let start = Instant::now();

        for i in 0..5 {
            let now = start + Duration::from_millis(i * 10);
            assert_eq!(limiter.check(id, now), LimitDecision::Allowed);
        }

        match limiter.check(id, start + Duration::from_millis(100)) {
            LimitDecision::Limited { retry_after } => {
                assert!(retry_after <= limiter.window());
                assert_eq!(retry_after, Duration::from_millis(900));
            }
            LimitDecision::Allowed => panic!("sixth action should be limited"),
        }
    }

    #[test]
    fn test_slot_frees_when_oldest_action_leaves_window() {
        let limiter = ActionLimiter::new(2, Duration::from_millis(200));
        let id = Uuid::new_v4();
        let start = Instant::now();

        assert_eq!(limiter.check(id, start), LimitDecision::Allowed);
        assert_eq!(
            limiter.check(id, start + Duration::from_millis(150)),
            LimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(id, start + Duration::from_millis(199)),
            LimitDecision::Limited {
                retry_after: Duration::from_millis(1)
            }
        );
        // Only the first action has expired; the second still holds a slot
        assert_eq!(
            limiter.check(id, start + Duration::from_millis(200)),
            LimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(id, start + Duration::from_millis(300)),
            LimitDecision::Limited {
                retry_after: Duration::from_millis(50)
            }
        );
    }

    #[test]
    fn test_burst_across_window_edge_is_capped() {
        let limiter = ActionLimiter::new(10, Duration::from_secs(1));
        let id = Uuid::new_v4();
        let start = Instant::now();

        let mut accepted = 0;
        let mut submit = |at_ms: u64, count: usize| {
            for _ in 0..count {
                if limiter.check(id, start + Duration::from_millis(at_ms)) == LimitDecision::Allowed {
                    accepted += 1;
                }
            }
        };
        submit(0, 1);
        submit(999, 9);
        submit(1_000, 10);

        // The action at t=0 expires at t=1000, freeing exactly one slot
        assert_eq!(accepted, 11);
    }

    #[test]
    fn test_buckets_are_per_entity() {
        let limiter = ActionLimiter::new(1, Duration::from_secs(1));
        let now = Instant::now();
        assert_eq!(limiter.check(Uuid::new_v4(), now), LimitDecision::Allowed);
        assert_eq!(limiter.check(Uuid::new_v4(), now), LimitDecision::Allowed);
    }

    #[test]
    fn test_prune_removes_stale_buckets() {
        let limiter = ActionLimiter::new(1, Duration::from_millis(100));
        let now = Instant::now();
        limiter.check(Uuid::new_v4(), now);
        limiter.prune(now + Duration::from_millis(150));
        assert!(limiter.buckets.is_empty());
    }

    #[test]
    fn test_agent_limiter_rejects_burst() {
        let limiter = create_agent_limiter(JOIN_RATE_LIMIT);
        let agent = Uuid::new_v4();
        assert!(limiter.check_key(&agent).is_ok());
        assert!(limiter.check_key(&agent).is_ok());
        assert!(limiter.check_key(&agent).is_err());
    }
}
