//! Convenient re-exports for common keygate types.
pub use crate::{
    admission::{AdmissionController, Admitted, API_KEY_HEADER, REMAINING_HEADER, RETRY_AFTER_HEADER},
    config::{AdmissionConfig, ConfigError, StoreConfig},
    plan::{PlanResolver, PricingPlan, UsagePlan},
    rate_limit::{AdmissionLayer, BucketRegistry, Decision, TokenBucket},
    routes::{ProtectedRoutes, MUTATING_METHODS},
    AdmissionError,
};
