//! In-process backend adapter
//!
//! Routes `Upstream` calls to stores living in the same process, keyed by
//! endpoint address. Used for single-process deployments and to drive the
//! front tier in tests without sockets. Calls per endpoint are counted so
//! callers can observe how traffic was spread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::Endpoint;
use crate::domain::{ItemPredicate, StoreReader, Upstream, UpstreamRequest};
use crate::error::{Error, Result};
use crate::inventory::PurchaseService;

struct LocalBackend {
    reader: Arc<dyn StoreReader>,
    purchases: Option<Arc<PurchaseService>>,
    calls: AtomicU64,
}

/// `Upstream` that dispatches to registered in-process backends.
#[derive(Default)]
pub struct LocalUpstream {
    backends: HashMap<Endpoint, LocalBackend>,
}

impl LocalUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a read-only backend (search and lookup).
    pub fn with_reader(mut self, endpoint: Endpoint, reader: Arc<dyn StoreReader>) -> Self {
        self.backends.insert(
            endpoint,
            LocalBackend {
                reader,
                purchases: None,
                calls: AtomicU64::new(0),
            },
        );
        self
    }

    /// Register a backend that also accepts purchases.
    pub fn with_store(
        mut self,
        endpoint: Endpoint,
        reader: Arc<dyn StoreReader>,
        purchases: Arc<PurchaseService>,
    ) -> Self {
        self.backends.insert(
            endpoint,
            LocalBackend {
                reader,
                purchases: Some(purchases),
                calls: AtomicU64::new(0),
            },
        );
        self
    }

    /// Calls routed to `endpoint` so far.
    pub fn calls(&self, endpoint: &Endpoint) -> u64 {
        self.backends
            .get(endpoint)
            .map(|backend| backend.calls.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for LocalUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalUpstream")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Upstream for LocalUpstream {
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &UpstreamRequest,
    ) -> Result<serde_json::Value> {
        let backend = self
            .backends
            .get(endpoint)
            .ok_or_else(|| Error::upstream(endpoint.as_str(), "no backend at this address"))?;
        backend.calls.fetch_add(1, Ordering::Relaxed);

        let value = match request {
            UpstreamRequest::Search { item_type } => {
                let items = backend
                    .reader
                    .search_items(&ItemPredicate::NameEquals(item_type.clone()))
                    .await?;
                serde_json::to_value(items)?
            }
            UpstreamRequest::Lookup { id } => {
                serde_json::to_value(backend.reader.read_item(*id).await?)?
            }
            UpstreamRequest::Purchase { id } => {
                let purchases = backend.purchases.as_ref().ok_or_else(|| {
                    Error::upstream(endpoint.as_str(), "backend does not accept purchases")
                })?;
                serde_json::to_value(purchases.purchase(*id).await?)?
            }
        };
        Ok(value)
    }
}
