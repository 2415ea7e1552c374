//! Dispatcher - per-class backend endpoint selection
//!
//! Each request class owns an independent endpoint list and rotation state.
//! The rotation state sits behind its own mutex so a selection is a single
//! read-modify-write: two concurrent callers can never both observe the same
//! counter value.
//!
//! Endpoint lists are static. There is no health checking, retry or failover;
//! a dead endpoint keeps being selected and its failures surface to callers.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::policy::{choose, SelectionPolicy};
use crate::error::{Error, Result};
use crate::metrics;

// =============================================================================
// Value Objects
// =============================================================================

/// Logical category of request; each class rotates independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestClass {
    Search,
    Lookup,
    Purchase,
}

impl RequestClass {
    pub const ALL: [RequestClass; 3] = [
        RequestClass::Search,
        RequestClass::Lookup,
        RequestClass::Purchase,
    ];

    /// Lowercase name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Search => "search",
            RequestClass::Lookup => "lookup",
            RequestClass::Purchase => "purchase",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base address of one backend instance, e.g. `http://10.0.0.5:4000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    /// Create an endpoint; trailing slashes are dropped.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let trimmed = address.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Config("endpoint address must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Base address without a trailing slash.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(address: String) -> Result<Self> {
        Self::new(address)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

struct Rotation {
    next: usize,
    loads: Vec<u64>,
}

struct ClassRoute {
    endpoints: Vec<Endpoint>,
    rotation: Mutex<Rotation>,
}

/// Selects a backend endpoint per request class.
pub struct Dispatcher {
    policy: SelectionPolicy,
    routes: HashMap<RequestClass, ClassRoute>,
}

impl Dispatcher {
    /// Create a dispatcher with no routes.
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            routes: HashMap::new(),
        }
    }

    /// Set the endpoint list for a class, resetting its rotation state.
    pub fn with_endpoints(mut self, class: RequestClass, endpoints: Vec<Endpoint>) -> Self {
        let rotation = Rotation {
            next: 0,
            loads: vec![0; endpoints.len()],
        };
        self.routes.insert(
            class,
            ClassRoute {
                endpoints,
                rotation: Mutex::new(rotation),
            },
        );
        self
    }

    /// Policy applied to every class.
    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Configured endpoints for a class (empty if none).
    pub fn endpoints(&self, class: RequestClass) -> &[Endpoint] {
        self.routes
            .get(&class)
            .map(|route| route.endpoints.as_slice())
            .unwrap_or_default()
    }

    /// Pick the endpoint for the next request of `class`.
    pub fn select(&self, class: RequestClass) -> Result<Endpoint> {
        let route = self
            .routes
            .get(&class)
            .filter(|route| !route.endpoints.is_empty())
            .ok_or_else(|| {
                Error::Config(format!("no endpoints configured for {} requests", class))
            })?;

        let index = {
            let mut rotation = route.rotation.lock();
            let Rotation { next, loads } = &mut *rotation;
            choose(self.policy, next, loads)
        };

        let endpoint = route.endpoints[index].clone();
        metrics::record_dispatch(class.as_str(), endpoint.as_str());
        trace!(class = %class, endpoint = %endpoint, policy = %self.policy, "Endpoint selected");
        Ok(endpoint)
    }

    /// Selection counters per endpoint for a class, in list order.
    pub fn loads(&self, class: RequestClass) -> Vec<(Endpoint, u64)> {
        match self.routes.get(&class) {
            Some(route) => {
                let rotation = route.rotation.lock();
                route
                    .endpoints
                    .iter()
                    .cloned()
                    .zip(rotation.loads.iter().copied())
                    .collect()
            }
            None => Vec::new(),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .field("classes", &self.routes.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
