//! Event-driven cache invalidation

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{CacheKey, ResponseCache};
use crate::domain::{ChangeEvent, EventSubscriber, Item};
use crate::error::Result;
use crate::metrics;

/// Drops cached responses made stale by a change event.
///
/// - item-changed: the item's lookup entry, plus the search entry for its name
/// - order-confirmed: same as item-changed for the purchased item
/// - catalog-changed: nothing; no cached response is keyed by catalog
///
/// When an event carries no payload the item's name is unknown, so every
/// search entry is dropped instead. An order-confirmed event that names no
/// item at all drops every entry.
pub struct CacheInvalidator {
    cache: Arc<ResponseCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }

    /// Apply the invalidation for one event; returns the number of entries removed.
    pub fn invalidate_for(&self, event: &ChangeEvent) -> usize {
        let item: Option<&Item> = match event {
            ChangeEvent::ItemChanged { state, .. } => state.as_ref(),
            ChangeEvent::OrderConfirmed { order, .. } => order.as_ref().map(|o| &o.item),
            ChangeEvent::CatalogChanged { id, .. } => {
                debug!(catalog_id = %id, "Catalog change does not affect cached responses");
                return 0;
            }
        };

        let Some(item_id) = event.item_id() else {
            // an identity-only order names no item, so any cached response may be stale
            let removed = self.cache.invalidate_where(|_| true);
            metrics::record_cache_invalidations(event.event_type(), removed);
            debug!(
                event_type = event.event_type(),
                entity_id = event.entity_id(),
                removed,
                "Cache flushed for event without item"
            );
            return removed;
        };

        let mut removed = usize::from(self.cache.invalidate(&CacheKey::Lookup(item_id)));
        removed += match item {
            Some(item) => usize::from(self.cache.invalidate(&CacheKey::Search(item.name.clone()))),
            None => self.cache.invalidate_where(CacheKey::is_search),
        };

        metrics::record_cache_invalidations(event.event_type(), removed);
        debug!(
            event_type = event.event_type(),
            item_id = %item_id,
            removed,
            "Cache invalidated"
        );
        removed
    }
}

#[async_trait]
impl EventSubscriber for CacheInvalidator {
    fn name(&self) -> &str {
        "cache-invalidator"
    }

    async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        self.invalidate_for(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CatalogId, ItemId};
    use serde_json::json;

    fn item(id: u64, name: &str) -> Item {
        Item {
            id: ItemId(id),
            name: name.into(),
            count: 3,
            price: 15.0,
            catalog_id: CatalogId(1),
        }
    }

    fn populated() -> Arc<ResponseCache> {
        let cache = Arc::new(ResponseCache::new(16));
        cache.put(CacheKey::Lookup(ItemId(1)), Arc::new(json!({"id": 1})));
        cache.put(CacheKey::Lookup(ItemId(2)), Arc::new(json!({"id": 2})));
        cache.put(CacheKey::Search("dos".into()), Arc::new(json!([1])));
        cache.put(CacheKey::Search("xen".into()), Arc::new(json!([2])));
        cache
    }

    #[tokio::test]
    async fn test_item_changed_drops_lookup_and_search() {
        let cache = populated();
        let invalidator = CacheInvalidator::new(Arc::clone(&cache));

        invalidator
            .handle(&ChangeEvent::item_changed(&item(1, "dos")))
            .await
            .unwrap();

        assert!(!cache.contains(&CacheKey::Lookup(ItemId(1))));
        assert!(!cache.contains(&CacheKey::Search("dos".into())));
        assert!(cache.contains(&CacheKey::Lookup(ItemId(2))));
        assert!(cache.contains(&CacheKey::Search("xen".into())));
    }

    #[test]
    fn test_identity_only_event_drops_all_searches() {
        let cache = populated();
        let invalidator = CacheInvalidator::new(Arc::clone(&cache));

        let removed = invalidator.invalidate_for(&ChangeEvent::item_touched(ItemId(2)));

        assert_eq!(removed, 3);
        assert!(cache.contains(&CacheKey::Lookup(ItemId(1))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_repeated_event_is_harmless() {
        let cache = populated();
        let invalidator = CacheInvalidator::new(Arc::clone(&cache));
        let event = ChangeEvent::item_changed(&item(2, "xen"));

        assert_eq!(invalidator.invalidate_for(&event), 2);
        assert_eq!(invalidator.invalidate_for(&event), 0);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_identity_only_order_drops_everything() {
        let cache = populated();
        let invalidator = CacheInvalidator::new(Arc::clone(&cache));

        let event: ChangeEvent =
            serde_json::from_str(r#"{"type":"order-confirmed","id":3}"#).unwrap();

        assert_eq!(invalidator.invalidate_for(&event), 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_catalog_change_keeps_entries() {
        let cache = populated();
        let invalidator = CacheInvalidator::new(Arc::clone(&cache));

        let event = ChangeEvent::catalog_changed(&crate::domain::Catalog {
            id: CatalogId(1),
            name: "books".into(),
        });
        assert_eq!(invalidator.invalidate_for(&event), 0);
        assert_eq!(cache.len(), 4);
    }
}
