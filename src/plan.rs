//! Usage plans and API-key classification.
//!
//! Every API key maps to exactly one [`UsagePlan`]. The built-in table is the closed
//! [`PricingPlan`] enum; the mapping from a key to a plan is a pure function of the
//! key's prefix, so any request that happens to create a bucket for a key builds it
//! with the same numbers.

use std::borrow::Cow;
use std::time::Duration;

/// Keys starting with this literal are classified as [`PricingPlan::Professional`].
pub const PROFESSIONAL_KEY_PREFIX: &str = "PX001-";
/// Keys starting with this literal are classified as [`PricingPlan::Basic`].
pub const BASIC_KEY_PREFIX: &str = "BX001-";

/// Refill window shared by the built-in plans.
pub const DEFAULT_REFILL_PERIOD: Duration = Duration::from_secs(20 * 60);
/// Shortest refill period a custom plan may use.
pub const MIN_REFILL_PERIOD: Duration = Duration::from_secs(1);

/// Errors produced when validating a custom [`UsagePlan`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Capacity must be > 0.
    #[error("plan '{name}': capacity must be > 0")]
    ZeroCapacity { name: String },
    /// Refill amount must be > 0.
    #[error("plan '{name}': refill_amount must be > 0")]
    ZeroRefillAmount { name: String },
    /// Refill period must be at least [`MIN_REFILL_PERIOD`].
    #[error("plan '{name}': refill_period must be >= {min:?} (got {provided:?})")]
    RefillPeriodTooShort { name: String, provided: Duration, min: Duration },
}

/// Immutable capacity and refill policy handed to a bucket at construction.
///
/// Refill is intervally: the whole `refill_amount` is credited once per elapsed
/// `refill_period`, never as a per-second trickle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePlan {
    name: Cow<'static, str>,
    capacity: u32,
    refill_amount: u32,
    refill_period: Duration,
}

impl UsagePlan {
    /// Create a validated plan.
    ///
    /// # Examples
    /// ```
    /// use keygate::UsagePlan;
    /// use std::time::Duration;
    /// let plan = UsagePlan::new("burst", 5, 5, Duration::from_secs(60)).unwrap();
    /// assert_eq!(plan.capacity(), 5);
    /// ```
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        capacity: u32,
        refill_amount: u32,
        refill_period: Duration,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        if capacity == 0 {
            return Err(PlanError::ZeroCapacity { name: name.into_owned() });
        }
        if refill_amount == 0 {
            return Err(PlanError::ZeroRefillAmount { name: name.into_owned() });
        }
        if refill_period < MIN_REFILL_PERIOD {
            return Err(PlanError::RefillPeriodTooShort {
                name: name.into_owned(),
                provided: refill_period,
                min: MIN_REFILL_PERIOD,
            });
        }
        Ok(Self { name, capacity, refill_amount, refill_period })
    }

    const fn builtin(name: &'static str, capacity: u32) -> Self {
        Self {
            name: Cow::Borrowed(name),
            capacity,
            refill_amount: capacity,
            refill_period: DEFAULT_REFILL_PERIOD,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of tokens the bucket can hold.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens credited per elapsed refill period.
    pub fn refill_amount(&self) -> u32 {
        self.refill_amount
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }
}

/// The closed set of built-in plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PricingPlan {
    Free,
    Basic,
    Professional,
}

impl PricingPlan {
    pub const ALL: [PricingPlan; 3] =
        [PricingPlan::Free, PricingPlan::Basic, PricingPlan::Professional];

    /// Classify a raw API-key header value. First match wins:
    /// missing or empty → `Free`, professional prefix → `Professional`,
    /// basic prefix → `Basic`, anything else → `Free`.
    pub fn for_api_key(api_key: Option<&str>) -> Self {
        match api_key {
            None | Some("") => PricingPlan::Free,
            Some(key) if key.starts_with(PROFESSIONAL_KEY_PREFIX) => PricingPlan::Professional,
            Some(key) if key.starts_with(BASIC_KEY_PREFIX) => PricingPlan::Basic,
            Some(_) => PricingPlan::Free,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            PricingPlan::Free => "FREE",
            PricingPlan::Basic => "BASIC",
            PricingPlan::Professional => "PROFESSIONAL",
        }
    }

    pub const fn capacity(self) -> u32 {
        match self {
            PricingPlan::Free => 20,
            PricingPlan::Basic => 40,
            PricingPlan::Professional => 100,
        }
    }

    pub fn usage_plan(self) -> UsagePlan {
        UsagePlan::builtin(self.name(), self.capacity())
    }
}

impl std::fmt::Display for PricingPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps an API key to the plan its bucket is built from.
///
/// Implementations must be pure: the registry may call this from whichever request
/// first presents a key, and the outcome must not depend on which one that was.
pub trait PlanResolver: Send + Sync + std::fmt::Debug {
    fn resolve_plan(&self, api_key: Option<&str>) -> UsagePlan;
}

/// Default resolver classifying keys by their prefix into [`PricingPlan`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyPrefixResolver;

impl PlanResolver for KeyPrefixResolver {
    fn resolve_plan(&self, api_key: Option<&str>) -> UsagePlan {
        PricingPlan::for_api_key(api_key).usage_plan()
    }
}

/// Resolves every key to the same plan. Handy for tests and single-tier deployments.
#[derive(Debug, Clone)]
pub struct FixedPlanResolver {
    plan: UsagePlan,
}

impl FixedPlanResolver {
    pub fn new(plan: UsagePlan) -> Self {
        Self { plan }
    }
}

impl PlanResolver for FixedPlanResolver {
    fn resolve_plan(&self, _api_key: Option<&str>) -> UsagePlan {
        self.plan.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_empty_keys_are_free() {
        assert_eq!(PricingPlan::for_api_key(None), PricingPlan::Free);
        assert_eq!(PricingPlan::for_api_key(Some("")), PricingPlan::Free);
        assert_eq!(KeyPrefixResolver.resolve_plan(None), KeyPrefixResolver.resolve_plan(Some("")));
    }

    #[test]
    fn prefixes_select_paid_plans() {
        assert_eq!(PricingPlan::for_api_key(Some("PX001-abc")), PricingPlan::Professional);
        assert_eq!(PricingPlan::for_api_key(Some("BX001-abc")), PricingPlan::Basic);
        assert_eq!(PricingPlan::for_api_key(Some("zzz")), PricingPlan::Free);
        // prefix must be at the start and is case sensitive
        assert_eq!(PricingPlan::for_api_key(Some("x-PX001-abc")), PricingPlan::Free);
        assert_eq!(PricingPlan::for_api_key(Some("px001-abc")), PricingPlan::Free);
    }

    #[test]
    fn classification_is_repeatable() {
        for key in ["", "PX001-", "BX001-1", "free-key", "PX001"] {
            let first = KeyPrefixResolver.resolve_plan(Some(key));
            for _ in 0..10 {
                assert_eq!(KeyPrefixResolver.resolve_plan(Some(key)), first);
            }
        }
    }

    #[test]
    fn builtin_table_values() {
        let free = PricingPlan::Free.usage_plan();
        assert_eq!((free.name(), free.capacity(), free.refill_amount()), ("FREE", 20, 20));
        assert_eq!(free.refill_period(), Duration::from_secs(1200));
        assert_eq!(PricingPlan::Basic.usage_plan().capacity(), 40);
        assert_eq!(PricingPlan::Professional.usage_plan().capacity(), 100);
        assert_eq!(PricingPlan::ALL.len(), 3);
    }

    #[test]
    fn custom_plan_validation() {
        assert!(matches!(
            UsagePlan::new("p", 0, 1, Duration::from_secs(1)),
            Err(PlanError::ZeroCapacity { .. })
        ));
        assert!(matches!(
            UsagePlan::new("p", 1, 0, Duration::from_secs(1)),
            Err(PlanError::ZeroRefillAmount { .. })
        ));
        let err = UsagePlan::new("p", 1, 1, Duration::from_millis(999)).unwrap_err();
        assert!(err.to_string().contains("refill_period"));
        assert!(UsagePlan::new("p", 1, 1, MIN_REFILL_PERIOD).is_ok());
    }
}
