//! Domain Ports (Port/Adapter Pattern)
//!
//! Trait abstractions the core depends on. The authoritative store, the
//! replica store, backend transports and event subscribers are all
//! collaborators behind these seams; `crate::adapters` holds the concrete
//! implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Core                                  │
//! │   Dispatcher │ ResponseCache │ ChangePropagator │ Replica    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Ports (Traits)                           │
//! │  StoreReader │ AuthoritativeStore │ ReplicaStore │ Upstream  │
//! │  ChangeHook  │ EventSubscriber                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Adapters (Impls)                            │
//! │  InMemoryStore │ HttpStoreReader │ HttpUpstream │ ...        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use super::events::ChangeEvent;
use super::model::{
    Catalog, CatalogId, Item, ItemId, ItemPredicate, ItemUpdate, NewCatalog, NewItem, NewOrder,
    Order,
};
use crate::cache::CacheKey;
use crate::dispatch::{Endpoint, RequestClass};
use crate::error::Result;

// =============================================================================
// Store Ports
// =============================================================================

/// Read side of a catalog/order store.
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Get an item by id.
    async fn read_item(&self, id: ItemId) -> Result<Item>;

    /// Get a catalog by id.
    async fn read_catalog(&self, id: CatalogId) -> Result<Catalog>;

    /// Find items matching a predicate, ordered by id.
    async fn search_items(&self, predicate: &ItemPredicate) -> Result<Vec<Item>>;

    /// List all catalogs, ordered by id.
    async fn list_catalogs(&self) -> Result<Vec<Catalog>>;

    /// List all orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;
}

/// The source of truth for catalogs, items and orders.
///
/// Every successful write is followed by exactly one call to the store's
/// emission hook (see [`ChangeHook`]) carrying the committed state.
#[async_trait]
pub trait AuthoritativeStore: StoreReader {
    /// Create a catalog, assigning its id.
    async fn create_catalog(&self, new: NewCatalog) -> Result<Catalog>;

    /// Create an item, assigning its id. The referenced catalog must exist.
    async fn create_item(&self, new: NewItem) -> Result<Item>;

    /// Atomically apply an update to one item.
    ///
    /// Fails with `NotFound` for an unknown id and `StockExhausted` when a
    /// decrement would cross zero; a failed update leaves the item unchanged
    /// and emits nothing.
    async fn update_item(&self, id: ItemId, update: ItemUpdate) -> Result<Item>;

    /// Append an order, assigning its id.
    async fn record_order(&self, new: NewOrder) -> Result<Order>;
}

/// Write side of a replica. Rows keep the identities assigned upstream.
#[async_trait]
pub trait ReplicaStore: StoreReader {
    /// Insert or overwrite a catalog.
    async fn put_catalog(&self, catalog: Catalog) -> Result<()>;

    /// Insert or overwrite an item.
    async fn put_item(&self, item: Item) -> Result<()>;

    /// Insert an order unless one with the same id exists.
    ///
    /// Returns `true` if the order was inserted.
    async fn put_order(&self, order: Order) -> Result<bool>;
}

// =============================================================================
// Change Notification Ports
// =============================================================================

/// Emission hook invoked synchronously after each committed store write.
///
/// Implementations must not block; anything slow belongs on the far side of
/// a channel.
pub trait ChangeHook: Send + Sync {
    fn on_change(&self, event: ChangeEvent);
}

/// A consumer of change events (cache invalidator, replica synchronizer,
/// forwarder to another tier).
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Handle one event. Errors are logged by the propagator and otherwise
    /// ignored.
    async fn handle(&self, event: &ChangeEvent) -> Result<()>;
}

// =============================================================================
// Backend Port
// =============================================================================

/// Logical operation forwarded to a backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamRequest {
    /// Items whose name equals the item type
    Search { item_type: String },
    /// Single item by id
    Lookup { id: ItemId },
    /// Buy one unit of an item
    Purchase { id: ItemId },
}

impl UpstreamRequest {
    /// Request class used for endpoint rotation.
    pub fn class(&self) -> RequestClass {
        match self {
            UpstreamRequest::Search { .. } => RequestClass::Search,
            UpstreamRequest::Lookup { .. } => RequestClass::Lookup,
            UpstreamRequest::Purchase { .. } => RequestClass::Purchase,
        }
    }

    /// Cache key for reads; writes are never cached.
    pub fn cache_key(&self) -> Option<CacheKey> {
        match self {
            UpstreamRequest::Search { item_type } => Some(CacheKey::Search(item_type.clone())),
            UpstreamRequest::Lookup { id } => Some(CacheKey::Lookup(*id)),
            UpstreamRequest::Purchase { .. } => None,
        }
    }
}

/// Port for talking to a backend endpoint.
///
/// One synchronous request/response per call; no retry, no failover. A
/// transport failure surfaces as `UpstreamUnavailable`, while errors the
/// backend reports (unknown id, out of stock) map to the matching variant.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &UpstreamRequest,
    ) -> Result<serde_json::Value>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_classes() {
        let search = UpstreamRequest::Search {
            item_type: "distributed systems".into(),
        };
        assert_eq!(search.class(), RequestClass::Search);
        assert_eq!(
            search.cache_key(),
            Some(CacheKey::Search("distributed systems".into()))
        );

        let lookup = UpstreamRequest::Lookup { id: ItemId(4) };
        assert_eq!(lookup.class(), RequestClass::Lookup);
        assert_eq!(lookup.cache_key(), Some(CacheKey::Lookup(ItemId(4))));
    }

    #[test]
    fn test_purchase_is_not_cached() {
        let purchase = UpstreamRequest::Purchase { id: ItemId(4) };
        assert_eq!(purchase.class(), RequestClass::Purchase);
        assert_eq!(purchase.cache_key(), None);
    }
}
