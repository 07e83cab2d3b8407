//! Startup configuration for the admission layer.
//!
//! Everything is validated once, when the layer is assembled; nothing here is consulted
//! on the request path. With the `config` feature the types deserialize from JSON:
//!
//! ```json
//! {
//!   "api_key_header": "X-api-key",
//!   "routes": [
//!     { "pattern": "/api/v1/transactions/**", "methods": ["POST", "PUT", "DELETE"] },
//!     { "pattern": "/api/v1/transactions/statistics" }
//!   ],
//!   "store": { "kind": "bounded", "max_keys": 100000, "idle_ttl_secs": 3600 }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::header::InvalidHeaderName;
use http::{HeaderName, Method};

use crate::admission::API_KEY_HEADER;
use crate::rate_limit::{AdmissionLayer, BoundedBucketStore, BucketRegistry};
use crate::routes::{ProtectedRoutes, RouteError};

/// Errors produced when validating an [`AdmissionConfig`].
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid api key header name '{name}': {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: InvalidHeaderName,
    },
    #[error("invalid http method '{method}' in route '{pattern}'")]
    InvalidMethod { pattern: String, method: String },
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("bounded store max_keys must be > 0")]
    ZeroStoreCapacity,
    #[error("bounded store idle_ttl_secs must be > 0 when set")]
    ZeroIdleTtl,
    #[cfg(feature = "config")]
    #[error("config decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Where buckets live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "config",
    derive(serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum StoreConfig {
    /// Keep every key's bucket for the life of the process.
    #[default]
    Unbounded,
    /// Keep at most `max_keys` buckets, optionally dropping idle ones.
    Bounded {
        max_keys: u64,
        #[cfg_attr(feature = "config", serde(default))]
        idle_ttl_secs: Option<u64>,
    },
}

/// A protected route pattern, optionally restricted to some methods.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize))]
pub struct RouteConfig {
    pub pattern: String,
    /// Empty means every method.
    #[cfg_attr(feature = "config", serde(default))]
    pub methods: Vec<String>,
}

impl RouteConfig {
    pub fn any_method(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), methods: Vec::new() }
    }
}

/// Top-level admission configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize), serde(default))]
pub struct AdmissionConfig {
    /// Request header carrying the API key. Matched case-insensitively.
    pub api_key_header: String,
    /// Routes under admission control. `None` protects every route.
    pub routes: Option<Vec<RouteConfig>>,
    pub store: StoreConfig,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            api_key_header: API_KEY_HEADER.as_str().to_owned(),
            routes: None,
            store: StoreConfig::default(),
        }
    }
}

impl AdmissionConfig {
    /// Construct a new builder with defaults.
    pub fn builder() -> AdmissionConfigBuilder {
        AdmissionConfigBuilder::new()
    }

    /// Parse a JSON document; missing fields take their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field without building anything long-lived.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.header_name()?;
        self.build_routes()?;
        self.check_store()
    }

    pub fn header_name(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::from_bytes(self.api_key_header.as_bytes()).map_err(|source| {
            ConfigError::InvalidHeaderName { name: self.api_key_header.clone(), source }
        })
    }

    pub fn build_routes(&self) -> Result<ProtectedRoutes, ConfigError> {
        let Some(routes) = &self.routes else {
            return Ok(ProtectedRoutes::all());
        };
        routes.iter().try_fold(ProtectedRoutes::new(), |table, route| {
            let methods = route
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                        ConfigError::InvalidMethod {
                            pattern: route.pattern.clone(),
                            method: m.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(table.protect_methods(&route.pattern, methods)?)
        })
    }

    fn check_store(&self) -> Result<(), ConfigError> {
        match self.store {
            StoreConfig::Unbounded => Ok(()),
            StoreConfig::Bounded { max_keys: 0, .. } => Err(ConfigError::ZeroStoreCapacity),
            StoreConfig::Bounded { idle_ttl_secs: Some(0), .. } => Err(ConfigError::ZeroIdleTtl),
            StoreConfig::Bounded { .. } => Ok(()),
        }
    }

    /// Registry with the configured store, default plan resolver and monotonic clock.
    pub fn build_registry(&self) -> Result<BucketRegistry, ConfigError> {
        self.check_store()?;
        let registry = BucketRegistry::new();
        Ok(match self.store {
            StoreConfig::Unbounded => registry,
            StoreConfig::Bounded { max_keys, idle_ttl_secs: None } => {
                registry.with_store(BoundedBucketStore::new(max_keys))
            }
            StoreConfig::Bounded { max_keys, idle_ttl_secs: Some(secs) } => registry
                .with_store(BoundedBucketStore::with_idle_ttl(max_keys, Duration::from_secs(secs))),
        })
    }

    /// Assemble a layer around an existing registry (e.g. one with a custom clock).
    pub fn layer_for(&self, registry: Arc<BucketRegistry>) -> Result<AdmissionLayer, ConfigError> {
        Ok(AdmissionLayer::new(registry)
            .with_api_key_header(self.header_name()?)
            .with_routes(self.build_routes()?))
    }

    pub fn into_layer(self) -> Result<AdmissionLayer, ConfigError> {
        let registry = Arc::new(self.build_registry()?);
        self.layer_for(registry)
    }
}

/// Builder for [`AdmissionConfig`]; `build` validates the result.
#[derive(Debug, Clone, Default)]
pub struct AdmissionConfigBuilder {
    config: AdmissionConfig,
}

impl AdmissionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the API key from `header` instead of `x-api-key`.
    pub fn api_key_header(mut self, header: impl Into<String>) -> Self {
        self.config.api_key_header = header.into();
        self
    }

    /// Add a protected route. The first call replaces the default protect-everything table.
    pub fn route(mut self, route: RouteConfig) -> Self {
        self.config.routes.get_or_insert_with(Vec::new).push(route);
        self
    }

    /// Protect nothing until routes are added.
    pub fn no_routes(mut self) -> Self {
        self.config.routes = Some(Vec::new());
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Build the configuration, validating inputs.
    pub fn build(self) -> Result<AdmissionConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
