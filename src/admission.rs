//! Per-request admission decisions.
//!
//! [`AdmissionController`] is the framework-agnostic half of the interceptor: given the
//! raw API-key header it resolves the key's bucket, withdraws one token and reports the
//! outcome. [`AdmissionLayer`](crate::AdmissionLayer) drives it from a Tower stack.
//!
//! Per request the controller walks `START → KeyChecked → {Rejected-NoKey |
//! BucketResolved} → {Allowed | Rejected-RateLimited}` exactly once; nothing is retried.

use std::borrow::Cow;
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::error::AdmissionError;
use crate::rate_limit::registry::redact_key;
use crate::rate_limit::{BucketRegistry, Decision};

/// Default request header carrying the API key.
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
/// Response header with the tokens left after an admitted request.
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
/// Response header with whole seconds to wait after a quota rejection.
pub const RETRY_AFTER_HEADER: HeaderName =
    HeaderName::from_static("x-rate-limit-retry-after-seconds");

/// A request that passed admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// Tokens left in the key's bucket after this request.
    pub remaining: u32,
}

impl Admitted {
    /// Annotate an outgoing response with `X-Rate-Limit-Remaining`.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(REMAINING_HEADER, HeaderValue::from(self.remaining));
    }
}

/// Stateless gate in front of business logic. All state lives in the registry's buckets.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    registry: Arc<BucketRegistry>,
    api_key_header: HeaderName,
}

impl AdmissionController {
    pub fn new(registry: Arc<BucketRegistry>) -> Self {
        Self { registry, api_key_header: API_KEY_HEADER }
    }

    /// Read the API key from a different request header.
    pub fn with_api_key_header(mut self, header: HeaderName) -> Self {
        self.api_key_header = header;
        self
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    pub fn api_key_header(&self) -> &HeaderName {
        &self.api_key_header
    }

    /// Extract the API key from request headers. Non-UTF-8 bytes are replaced rather than
    /// rejected; an empty value counts as absent.
    pub fn api_key<'h>(&self, headers: &'h HeaderMap) -> Option<Cow<'h, str>> {
        headers
            .get(&self.api_key_header)
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
            .filter(|key| !key.is_empty())
    }

    /// Judge a request by its headers.
    pub fn admit_headers(&self, headers: &HeaderMap) -> Result<Admitted, AdmissionError> {
        let key = self.api_key(headers);
        self.admit(key.as_deref())
    }

    /// Judge a request by its raw API key.
    ///
    /// # Errors
    /// - [`AdmissionError::MissingCredential`] if the key is absent or empty; the registry
    ///   is not consulted and no token is consumed.
    /// - [`AdmissionError::QuotaExceeded`] if the key's bucket is empty.
    pub fn admit(&self, api_key: Option<&str>) -> Result<Admitted, AdmissionError> {
        let key = match api_key {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(AdmissionError::MissingCredential {
                    header: self.api_key_header.clone(),
                })
            }
        };

        let bucket = self.registry.resolve_bucket(key);
        match bucket.try_consume() {
            Decision::Allowed { remaining } => {
                debug!(key = %redact_key(key), remaining, "request admitted");
                Ok(Admitted { remaining })
            }
            Decision::Denied { wait } => {
                warn!(
                    key = %redact_key(key),
                    plan = bucket.plan().name(),
                    retry_after_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "api request quota exhausted"
                );
                Err(AdmissionError::QuotaExceeded { retry_after: wait })
            }
        }
    }
}
