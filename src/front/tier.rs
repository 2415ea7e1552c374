//! Front tier request handling
//!
//! Reads go cache-first: a hit is answered locally, a miss selects a backend
//! for the request class, forwards, caches the payload and returns it.
//! Purchases are never cached; a successful purchase drops the item's cached
//! responses right away instead of waiting for the change event to arrive.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKey, CacheStats, Payload, ResponseCache};
use crate::dispatch::{Dispatcher, Endpoint, RequestClass};
use crate::domain::{ItemId, Upstream, UpstreamRequest};
use crate::error::{Error, Result};
use crate::metrics;

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    Cache,
    Backend,
}

/// A front tier answer plus its provenance.
#[derive(Debug, Clone)]
pub struct Answer {
    pub payload: Payload,
    pub source: Source,
}

/// Snapshot for the diagnostics route.
#[derive(Debug, Clone, Serialize)]
pub struct FrontStatus {
    pub cache: CacheStats,
    pub loads: Vec<ClassLoad>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassLoad {
    pub class: RequestClass,
    pub endpoint: Endpoint,
    pub selections: u64,
}

/// Dispatch-and-cache tier.
pub struct FrontTier {
    dispatcher: Arc<Dispatcher>,
    cache: Arc<ResponseCache>,
    upstream: Arc<dyn Upstream>,
}

impl FrontTier {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        cache: Arc<ResponseCache>,
        upstream: Arc<dyn Upstream>,
    ) -> Self {
        Self {
            dispatcher,
            cache,
            upstream,
        }
    }

    /// Shared response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Backend selector.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Items whose name equals `item_type`.
    #[instrument(skip(self))]
    pub async fn search(&self, item_type: &str) -> Result<Answer> {
        if item_type.trim().is_empty() {
            return Err(Error::Validation("item type must not be empty".into()));
        }
        self.read_through(UpstreamRequest::Search {
            item_type: item_type.to_string(),
        })
        .await
    }

    /// A single item by id.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn info(&self, id: ItemId) -> Result<Answer> {
        self.read_through(UpstreamRequest::Lookup { id }).await
    }

    /// Buy one unit of an item.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn purchase(&self, id: ItemId) -> Result<serde_json::Value> {
        let request = UpstreamRequest::Purchase { id };
        let receipt = self.forward(&request).await?;

        let mut dropped = usize::from(self.cache.invalidate(&CacheKey::Lookup(id)));
        if let Some(name) = receipt
            .get("item")
            .and_then(|item| item.get("name"))
            .and_then(|name| name.as_str())
        {
            dropped += usize::from(self.cache.invalidate(&CacheKey::Search(name.to_string())));
        }
        debug!(item_id = %id, dropped, "Cache entries dropped after purchase");

        Ok(receipt)
    }

    /// Cached entries, most recently used first.
    pub fn cached_entries(&self) -> Vec<(CacheKey, Payload)> {
        self.cache.list_entries()
    }

    /// Cache statistics plus selection counters for every configured endpoint.
    pub fn status(&self) -> FrontStatus {
        let loads = RequestClass::ALL
            .iter()
            .flat_map(|class| {
                self.dispatcher
                    .loads(*class)
                    .into_iter()
                    .map(move |(endpoint, selections)| ClassLoad {
                        class: *class,
                        endpoint,
                        selections,
                    })
            })
            .collect();

        FrontStatus {
            cache: self.cache.stats(),
            loads,
        }
    }

    async fn read_through(&self, request: UpstreamRequest) -> Result<Answer> {
        let key = request
            .cache_key()
            .ok_or_else(|| Error::Internal(format!("{:?} is not cacheable", request)))?;

        if let Some(payload) = self.cache.get(&key) {
            metrics::record_cache_lookup(true);
            debug!(key = %key, "Cache hit");
            return Ok(Answer {
                payload,
                source: Source::Cache,
            });
        }
        metrics::record_cache_lookup(false);
        debug!(key = %key, "Cache miss");

        let payload: Payload = Arc::new(self.forward(&request).await?);
        if let Some(evicted) = self.cache.put(key, payload.clone()) {
            debug!(evicted = %evicted, "Least recently used entry evicted");
        }

        Ok(Answer {
            payload,
            source: Source::Backend,
        })
    }

    async fn forward(&self, request: &UpstreamRequest) -> Result<serde_json::Value> {
        let class = request.class();
        let endpoint = self.dispatcher.select(class)?;
        let started = Instant::now();

        let result = self.upstream.call(&endpoint, request).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(_) => info!(
                class = %class,
                endpoint = %endpoint,
                elapsed_ms,
                "Backend request served"
            ),
            Err(e) => {
                metrics::record_upstream_error(class.as_str(), e);
                warn!(
                    class = %class,
                    endpoint = %endpoint,
                    elapsed_ms,
                    error = %e,
                    "Backend request failed"
                );
            }
        }
        result
    }
}

impl std::fmt::Debug for FrontTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontTier")
            .field("dispatcher", &self.dispatcher)
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryStore, LocalUpstream};
    use crate::dispatch::SelectionPolicy;
    use crate::domain::{AuthoritativeStore, CatalogId, NewCatalog, NewItem};
    use crate::inventory::PurchaseService;
    use assert_matches::assert_matches;

    struct Fixture {
        front: FrontTier,
        upstream: Arc<LocalUpstream>,
        a: Endpoint,
        b: Endpoint,
    }

    async fn fixture(count: u32) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_catalog(NewCatalog {
                name: "systems".into(),
            })
            .await
            .unwrap();
        store
            .create_item(NewItem {
                name: "RPCs for Noobs".into(),
                count,
                price: 10.0,
                catalog_id: CatalogId(1),
            })
            .await
            .unwrap();

        let a = Endpoint::new("local://a").unwrap();
        let b = Endpoint::new("local://b").unwrap();
        let purchases = Arc::new(PurchaseService::new(store.clone()));
        let upstream = Arc::new(
            LocalUpstream::new()
                .with_store(a.clone(), store.clone(), purchases.clone())
                .with_store(b.clone(), store.clone(), purchases),
        );
        let both = vec![a.clone(), b.clone()];
        let dispatcher = Arc::new(
            Dispatcher::new(SelectionPolicy::RoundRobin)
                .with_endpoints(RequestClass::Search, both.clone())
                .with_endpoints(RequestClass::Lookup, both.clone())
                .with_endpoints(RequestClass::Purchase, both),
        );

        Fixture {
            front: FrontTier::new(dispatcher, Arc::new(ResponseCache::new(16)), upstream.clone()),
            upstream,
            a,
            b,
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let f = fixture(2).await;

        let first = f.front.info(ItemId(1)).await.unwrap();
        let second = f.front.info(ItemId(1)).await.unwrap();

        assert_eq!(first.source, Source::Backend);
        assert_eq!(second.source, Source::Cache);
        assert_eq!(first.payload, second.payload);
        assert_eq!(f.upstream.calls(&f.a) + f.upstream.calls(&f.b), 1);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_type_before_dispatch() {
        let f = fixture(2).await;

        assert_matches!(f.front.search("  ").await, Err(Error::Validation(_)));
        assert_eq!(f.upstream.calls(&f.a) + f.upstream.calls(&f.b), 0);
        assert!(f.front.cached_entries().is_empty());
    }

    #[tokio::test]
    async fn test_misses_alternate_backends() {
        let f = fixture(2).await;

        f.front.search("RPCs for Noobs").await.unwrap();
        f.front.search("Xen").await.unwrap();

        assert_eq!(f.upstream.calls(&f.a), 1);
        assert_eq!(f.upstream.calls(&f.b), 1);
    }

    #[tokio::test]
    async fn test_purchase_drops_cached_entries() {
        let f = fixture(2).await;

        f.front.info(ItemId(1)).await.unwrap();
        f.front.search("RPCs for Noobs").await.unwrap();
        assert_eq!(f.front.cached_entries().len(), 2);

        let receipt = f.front.purchase(ItemId(1)).await.unwrap();
        assert_eq!(receipt["item"]["count"], 1);
        assert!(f.front.cached_entries().is_empty());

        let fresh = f.front.info(ItemId(1)).await.unwrap();
        assert_eq!(fresh.source, Source::Backend);
        assert_eq!(fresh.payload["count"], 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let f = fixture(0).await;

        assert_matches!(f.front.info(ItemId(9)).await, Err(Error::NotFound { .. }));
        assert_matches!(
            f.front.purchase(ItemId(1)).await,
            Err(Error::StockExhausted { item_id: 1 })
        );
        assert!(f.front.cached_entries().is_empty());
    }

    #[tokio::test]
    async fn test_status_reports_loads() {
        let f = fixture(2).await;
        f.front.info(ItemId(1)).await.unwrap();

        let status = f.front.status();
        let lookup: u64 = status
            .loads
            .iter()
            .filter(|l| l.class == RequestClass::Lookup)
            .map(|l| l.selections)
            .sum();
        assert_eq!(lookup, 1);
        assert_eq!(status.cache.misses, 1);
    }
}
