#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # keygate
//!
//! Per-API-key admission control for HTTP services: every key gets its own token bucket,
//! sized by the usage plan its prefix selects, and every protected request spends one
//! token or is turned away with a retry hint.
//!
//! ## Features
//!
//! - **Plan resolution** from the key's shape (`FREE`, `BASIC`, `PROFESSIONAL`)
//! - **Lazy, per-key buckets** created exactly once even under concurrent first use
//! - **Intervally refill** crediting whole periods, never a trickle
//! - **Lock-free withdrawals** using a single atomic per bucket
//! - **Tower middleware** producing `400`/`429` responses and rate-limit headers
//! - **Bounded registries** via `moka` when the key space is open-ended
//!
//! ## Quick Start
//!
//! ```rust
//! use keygate::{AdmissionLayer, BucketRegistry, API_KEY_HEADER, REMAINING_HEADER};
//! use http::{Request, Response};
//! use std::sync::Arc;
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(BucketRegistry::new());
//!     let svc = AdmissionLayer::new(registry).layer(service_fn(|_req: Request<()>| async {
//!         Ok::<_, std::convert::Infallible>(Response::new(String::from("ok")))
//!     }));
//!
//!     let req = Request::builder()
//!         .uri("/api/v1/transactions")
//!         .header(API_KEY_HEADER, "PX001-demo")
//!         .body(())
//!         .unwrap();
//!     let response = svc.oneshot(req).await.unwrap();
//!     assert_eq!(response.headers()[REMAINING_HEADER], "99");
//! }
//! ```

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod plan;
pub mod prelude;
pub mod rate_limit;
pub mod routes;

// Re-exports
pub use admission::{
    AdmissionController, Admitted, API_KEY_HEADER, REMAINING_HEADER, RETRY_AFTER_HEADER,
};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{AdmissionConfig, AdmissionConfigBuilder, ConfigError, RouteConfig, StoreConfig};
pub use error::AdmissionError;
pub use plan::{
    FixedPlanResolver, KeyPrefixResolver, PlanError, PlanResolver, PricingPlan, UsagePlan,
    BASIC_KEY_PREFIX, PROFESSIONAL_KEY_PREFIX,
};
pub use rate_limit::{
    AdmissionLayer, AdmissionService, BoundedBucketStore, BucketRegistry, BucketStore,
    ConcurrentBucketStore, Decision, TokenBucket,
};
pub use routes::{PathPattern, ProtectedRoutes, RouteError, RouteRule, MUTATING_METHODS};
