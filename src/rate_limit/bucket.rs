//! Token bucket with intervally refill, lock-free via a single packed atomic.

use crate::clock::{Clock, MonotonicClock};
use crate::plan::UsagePlan;
use crate::rate_limit::Decision;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// State word layout: high 32 bits count refill intervals already credited since
// `created_at_millis`, low 32 bits hold the available tokens. The last refill
// timestamp is therefore always `created_at + intervals * period`, so a refill
// advances it by whole intervals and never loses partial-interval progress.
const TOKEN_MASK: u64 = 0xFFFF_FFFF;

fn pack(intervals: u32, tokens: u32) -> u64 {
    (u64::from(intervals) << 32) | u64::from(tokens)
}

fn unpack(raw: u64) -> (u32, u32) {
    ((raw >> 32) as u32, (raw & TOKEN_MASK) as u32)
}

/// A token bucket bound to one API key.
///
/// Starts full. Every elapsed `refill_period` credits `refill_amount` tokens, capped at
/// `capacity`. Withdrawals are compare-and-swap on one `AtomicU64`, so concurrent
/// requests on the same key never double-spend and never lose an update, while
/// requests on other keys touch other buckets entirely.
#[derive(Debug)]
pub struct TokenBucket {
    plan: UsagePlan,
    period_millis: u64,
    created_at_millis: u64,
    state: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// Create a full bucket for `plan`, timing refills with `clock`.
    pub fn new(plan: UsagePlan, clock: Arc<dyn Clock>) -> Self {
        // UsagePlan guarantees a period of at least one second.
        let period_millis = u64::try_from(plan.refill_period().as_millis()).unwrap_or(u64::MAX);
        let created_at_millis = clock.now_millis();
        let state = AtomicU64::new(pack(0, plan.capacity()));
        Self { plan, period_millis, created_at_millis, state, clock }
    }

    /// Create a full bucket using the process monotonic clock.
    pub fn with_monotonic_clock(plan: UsagePlan) -> Self {
        Self::new(plan, Arc::new(MonotonicClock::default()))
    }

    pub fn plan(&self) -> &UsagePlan {
        &self.plan
    }

    pub fn capacity(&self) -> u32 {
        self.plan.capacity()
    }

    /// Attempt to withdraw one token, crediting any owed refill first.
    pub fn try_consume(&self) -> Decision {
        let now = self.clock.now_millis();
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (intervals, tokens) = unpack(current);
            let (intervals, tokens) = self.refilled(intervals, tokens, now);

            if tokens == 0 {
                // Nothing was credited (refill_amount > 0), so there is no state to publish.
                return Decision::Denied { wait: self.wait_for_next_refill(intervals, now) };
            }

            let next = pack(intervals, tokens - 1);
            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Decision::Allowed { remaining: tokens - 1 },
                Err(actual) => current = actual,
            }
        }
    }

    /// Tokens a withdrawal would see right now, including owed refill. Does not mutate.
    pub fn available_tokens(&self) -> u32 {
        let (intervals, tokens) = unpack(self.state.load(Ordering::Acquire));
        self.refilled(intervals, tokens, self.clock.now_millis()).1
    }

    /// Clock reading (millis) of the most recent whole-interval refill boundary.
    pub fn last_refill_millis(&self) -> u64 {
        let (intervals, _) = unpack(self.state.load(Ordering::Acquire));
        self.boundary_millis(intervals)
    }

    fn boundary_millis(&self, intervals: u32) -> u64 {
        let elapsed = u64::from(intervals).saturating_mul(self.period_millis);
        self.created_at_millis.saturating_add(elapsed)
    }

    fn refilled(&self, intervals: u32, tokens: u32, now: u64) -> (u32, u32) {
        let elapsed = now.saturating_sub(self.boundary_millis(intervals));
        let owed = elapsed / self.period_millis;
        if owed == 0 {
            return (intervals, tokens);
        }

        let credit = owed.saturating_mul(u64::from(self.plan.refill_amount()));
        let capacity = u64::from(self.plan.capacity());
        let refilled = u64::from(tokens).saturating_add(credit).min(capacity);
        let intervals = u64::from(intervals).saturating_add(owed);
        tracing::trace!(owed, tokens = refilled, plan = self.plan.name(), "token bucket refill");
        (
            u32::try_from(intervals).unwrap_or(u32::MAX),
            u32::try_from(refilled).unwrap_or(self.plan.capacity()),
        )
    }

    fn wait_for_next_refill(&self, intervals: u32, now: u64) -> Duration {
        let next = self.boundary_millis(intervals.saturating_add(1));
        Duration::from_millis(next.saturating_sub(now).max(1))
    }
}
