//! Process configuration
//!
//! A `TierConfig` can be loaded from YAML; every section has defaults so a
//! file only needs the values that differ. The binary layers CLI flags and
//! environment variables on top before calling [`TierConfig::validate`].
//!
//! ```yaml
//! role: front
//! listen: 0.0.0.0:8000
//! front:
//!   policy: round-robin
//!   search: [http://catalog-a:4000, http://catalog-b:4000]
//!   lookup: [http://catalog-a:4000, http://catalog-b:4000]
//!   purchase: [http://order-a:5000]
//!   cache_capacity: 1000
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{LruConfig, DEFAULT_CAPACITY};
use crate::dispatch::{Dispatcher, Endpoint, RequestClass, SelectionPolicy};
use crate::domain::validate_price;
use crate::error::{Error, Result};
use crate::propagation::DEFAULT_QUEUE_DEPTH;
use crate::replica::ApplyMode;

/// Which tier this process serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Dispatch-and-cache tier
    #[default]
    Front,
    /// Authoritative catalog/order service
    Store,
    /// Replica of a store
    Replica,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Role::Front => "front",
            Role::Store => "store",
            Role::Replica => "replica",
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierConfig {
    pub role: Role,
    /// Address the HTTP server binds to
    pub listen: String,
    pub front: FrontConfig,
    pub store: StoreConfig,
    pub replica: ReplicaConfig,
    pub propagation: PropagationConfig,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            role: Role::default(),
            listen: "0.0.0.0:8000".to_string(),
            front: FrontConfig::default(),
            store: StoreConfig::default(),
            replica: ReplicaConfig::default(),
            propagation: PropagationConfig::default(),
        }
    }
}

impl TierConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid YAML: {}", e)))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Parsed bind address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address '{}': {}", self.listen, e)))
    }

    /// Check the sections the configured role uses.
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        self.propagation.validate()?;
        match self.role {
            Role::Front => self.front.validate(),
            Role::Store => self.store.validate(),
            Role::Replica => self.replica.validate(),
        }
    }
}

// =============================================================================
// Front
// =============================================================================

/// Dispatch and cache settings for the front tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrontConfig {
    pub policy: SelectionPolicy,
    pub search: Vec<Endpoint>,
    pub lookup: Vec<Endpoint>,
    pub purchase: Vec<Endpoint>,
    pub cache_capacity: usize,
    /// Entry lifetime in seconds; unset means entries live until evicted
    pub cache_ttl_secs: Option<u64>,
    pub request_timeout_ms: u64,
}

impl Default for FrontConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::default(),
            search: Vec::new(),
            lookup: Vec::new(),
            purchase: Vec::new(),
            cache_capacity: DEFAULT_CAPACITY,
            cache_ttl_secs: None,
            request_timeout_ms: 5_000,
        }
    }
}

impl FrontConfig {
    pub fn validate(&self) -> Result<()> {
        for class in RequestClass::ALL {
            if self.endpoints(class).is_empty() {
                return Err(Error::Config(format!(
                    "front tier needs at least one {} endpoint",
                    class
                )));
            }
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config("cache_capacity must be > 0".into()));
        }
        if self.cache_ttl_secs == Some(0) {
            return Err(Error::Config("cache_ttl_secs must be > 0 when set".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Endpoints configured for a request class.
    pub fn endpoints(&self, class: RequestClass) -> &[Endpoint] {
        match class {
            RequestClass::Search => &self.search,
            RequestClass::Lookup => &self.lookup,
            RequestClass::Purchase => &self.purchase,
        }
    }

    /// Upstream request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_config(&self) -> LruConfig {
        LruConfig {
            capacity: self.cache_capacity,
            ttl: self.cache_ttl_secs.map(Duration::from_secs),
        }
    }

    pub fn build_dispatcher(&self) -> Dispatcher {
        RequestClass::ALL
            .into_iter()
            .fold(Dispatcher::new(self.policy), |dispatcher, class| {
                dispatcher.with_endpoints(class, self.endpoints(class).to_vec())
            })
    }
}

// =============================================================================
// Store
// =============================================================================

/// Authoritative store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Catalogs and items created at startup
    pub seed: Vec<SeedCatalog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedCatalog {
    pub name: String,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedItem {
    pub name: String,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub price: f64,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        for catalog in &self.seed {
            if catalog.name.trim().is_empty() {
                return Err(Error::Config("seed catalog name must not be empty".into()));
            }
            for item in &catalog.items {
                if item.name.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "seed item in catalog '{}' has an empty name",
                        catalog.name
                    )));
                }
                validate_price(item.price).map_err(|e| Error::Config(e.to_string()))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Replica
// =============================================================================

/// Replica settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicaConfig {
    /// Base address of the store to mirror
    pub source: Option<Endpoint>,
    pub apply_mode: ApplyMode,
    pub request_timeout_ms: u64,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            source: None,
            apply_mode: ApplyMode::default(),
            request_timeout_ms: 5_000,
        }
    }
}

impl ReplicaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.is_none() {
            return Err(Error::Config("replica needs a source store address".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Config("request_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Upstream request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// =============================================================================
// Propagation
// =============================================================================

/// Change propagation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropagationConfig {
    /// Events a subscriber may fall behind before it starts skipping
    pub queue_depth: usize,
    /// Peers whose `/events` endpoint receives every change
    pub forward_to: Vec<Endpoint>,
    pub forward_timeout_ms: u64,
    /// Write every change event to the log at info level
    pub log_events: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            forward_to: Vec::new(),
            forward_timeout_ms: 2_000,
            log_events: false,
        }
    }
}

impl PropagationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(Error::Config("queue_depth must be > 0".into()));
        }
        if self.forward_timeout_ms == 0 {
            return Err(Error::Config("forward_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Per-event timeout for HTTP forwarding.
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }
}
