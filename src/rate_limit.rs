//! Per-key rate limiting primitives.
//!
//! This module provides the building blocks for admission control:
//! - [`TokenBucket`]: capacity plus intervally refill for one API key.
//! - [`BucketRegistry`]: resolves an API key to its bucket, creating it on first sight.
//! - [`AdmissionLayer`]: Tower middleware that enforces the limit on HTTP requests.
//! - [`Decision`]: the result of a withdrawal attempt (Allowed/Denied).
//!
//! # Architecture
//!
//! - **Middleware**: `AdmissionLayer` wraps your service. It doesn't know *how* limiting
//!   works, only that it should ask the registry for a bucket and take a token.
//! - **Logic**: `TokenBucket` (in `bucket`) handles the refill math.
//! - **Storage**: `BucketStore` (in `store`) owns the key → bucket map, either unbounded
//!   or as a bounded cache.

use std::time::Duration;

pub mod bucket;
pub mod middleware;
pub mod registry;
pub mod store;

pub use bucket::TokenBucket;
pub use middleware::{AdmissionLayer, AdmissionService};
pub use registry::BucketRegistry;
pub use store::{BoundedBucketStore, BucketStore, ConcurrentBucketStore};

/// The decision returned by a bucket withdrawal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request is allowed to proceed.
    Allowed {
        /// Number of tokens remaining after this withdrawal.
        /// Reported as `X-Rate-Limit-Remaining`.
        remaining: u32,
    },
    /// The request is denied.
    Denied {
        /// Time until the next refill boundary.
        /// Reported, rounded up to whole seconds, as `X-Rate-Limit-Retry-After-Seconds`.
        wait: Duration,
    },
}

impl Decision {
    /// Helper to check if allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Tokens left after an allowed withdrawal.
    pub fn remaining(&self) -> Option<u32> {
        match self {
            Decision::Allowed { remaining } => Some(*remaining),
            Decision::Denied { .. } => None,
        }
    }

    /// Whole seconds a denied caller should wait, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { wait } => Some(whole_seconds_ceil(*wait)),
        }
    }
}

/// Round a wait up to whole seconds, never reporting zero.
pub(crate) fn whole_seconds_ceil(wait: Duration) -> u64 {
    let secs = wait.as_secs();
    let secs = if wait.subsec_nanos() > 0 { secs.saturating_add(1) } else { secs };
    secs.max(1)
}
