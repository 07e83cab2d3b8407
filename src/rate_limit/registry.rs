//! Registry resolving API keys to their token buckets.
//!
//! Built once at startup and shared by reference with every admission layer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, MonotonicClock};
use crate::plan::{KeyPrefixResolver, PlanResolver};
use crate::rate_limit::store::{BucketStore, ConcurrentBucketStore};
use crate::rate_limit::TokenBucket;
use tracing::debug;

const REDACTED_PREFIX_CHARS: usize = 6;

/// Owns every live bucket and provisions new ones lazily.
#[derive(Debug)]
pub struct BucketRegistry {
    store: Arc<dyn BucketStore>,
    resolver: Arc<dyn PlanResolver>,
    clock: Arc<dyn Clock>,
    created: AtomicU64,
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketRegistry {
    /// Unbounded registry classifying keys by prefix and timing refills monotonically.
    pub fn new() -> Self {
        Self {
            store: Arc::new(ConcurrentBucketStore::new()),
            resolver: Arc::new(KeyPrefixResolver),
            clock: Arc::new(MonotonicClock::default()),
            created: AtomicU64::new(0),
        }
    }

    /// Replace the backing store (e.g. a [`BoundedBucketStore`](crate::BoundedBucketStore)).
    pub fn with_store<S: BucketStore + 'static>(mut self, store: S) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn with_resolver<R: PlanResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Override the clock handed to new buckets (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Return the bucket for `api_key`, creating it from the key's plan on first sight.
    ///
    /// Concurrent first-time callers for the same key all receive the same instance and
    /// exactly one bucket is constructed.
    pub fn resolve_bucket(&self, api_key: &str) -> Arc<TokenBucket> {
        self.store.get_or_insert_with(api_key, &mut || {
            let plan = self.resolver.resolve_plan(Some(api_key));
            self.created.fetch_add(1, Ordering::Relaxed);
            debug!(
                target: "keygate::registry",
                key = %redact_key(api_key),
                plan = plan.name(),
                capacity = plan.capacity(),
                "provisioned token bucket"
            );
            Arc::new(TokenBucket::new(plan, self.clock.clone()))
        })
    }

    /// Existing bucket for `api_key`, without provisioning one.
    pub fn peek(&self, api_key: &str) -> Option<Arc<TokenBucket>> {
        self.store.get(api_key)
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Total buckets ever constructed, including any since evicted.
    pub fn buckets_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

/// Log-safe rendering of an API key: its first few characters and its length.
pub(crate) fn redact_key(api_key: &str) -> String {
    let total = api_key.chars().count();
    let shown: String = api_key.chars().take(REDACTED_PREFIX_CHARS).collect();
    if total > REDACTED_PREFIX_CHARS {
        format!("{shown}…({total} chars)")
    } else {
        format!("{shown}({total} chars)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::store::BoundedBucketStore;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut guard = self.0.lock().unwrap();
            guard.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn same_key_same_bucket_distinct_keys_distinct_buckets() {
        let registry = BucketRegistry::new().with_clock(ManualClock::new());
        let a1 = registry.resolve_bucket("alpha");
        let a2 = registry.resolve_bucket("alpha");
        let b = registry.resolve_bucket("beta");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.buckets_created(), 2);
    }

    #[test]
    fn buckets_take_the_key_plan() {
        let registry = BucketRegistry::new();
        assert_eq!(registry.resolve_bucket("PX001-team").capacity(), 100);
        assert_eq!(registry.resolve_bucket("BX001-team").capacity(), 40);
        assert_eq!(registry.resolve_bucket("anything").capacity(), 20);
    }

    #[test]
    fn peek_never_provisions() {
        let registry = BucketRegistry::new();
        assert!(registry.peek("ghost").is_none());
        assert!(registry.is_empty());
        assert_eq!(registry.buckets_created(), 0);
    }

    #[test]
    fn bounded_store_counts_recreated_buckets() {
        let store = BoundedBucketStore::new(1);
        let registry = BucketRegistry::new().with_clock(ManualClock::new()).with_store(store.clone());

        let original = registry.resolve_bucket("evicted");
        while original.try_consume().is_allowed() {}
        store.run_pending_tasks();

        registry.resolve_bucket("other");
        store.run_pending_tasks();
        assert!(registry.peek("evicted").is_none());
        assert_eq!(registry.buckets_created(), 2);

        let fresh = registry.resolve_bucket("evicted");
        assert_eq!(registry.buckets_created(), 3);
        assert!(!Arc::ptr_eq(&original, &fresh));
        assert_eq!(fresh.available_tokens(), 20);
    }

    #[test]
    fn provisioning_log_redacts_key() {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = SharedWriter(buffer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_writer(BoxMakeWriter::new(writer))
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let registry = BucketRegistry::new();
        registry.resolve_bucket("PX001-super-secret-value");

        let logs = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("provisioned token bucket"), "logs: {logs}");
        assert!(logs.contains("PROFESSIONAL"));
        assert!(!logs.contains("super-secret"), "key leaked into logs: {logs}");
    }

    #[test]
    fn redaction_format() {
        assert_eq!(redact_key("abc"), "abc(3 chars)");
        assert_eq!(redact_key("PX001-xyz"), "PX001-…(9 chars)");
    }
}
