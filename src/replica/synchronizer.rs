//! Replica Synchronizer
//!
//! Keeps a replica store close to the authoritative store:
//!
//! 1. `bootstrap` copies every catalog, item and order once per process,
//!    preserving identities. An atomic flag short-circuits repeat calls and an
//!    async lock serializes the first ones, so concurrent callers never copy
//!    twice. A failed copy leaves the flag unset and can be retried.
//! 2. `apply` folds each change event into the replica. Events carry absolute
//!    state, so applying one twice or late leaves the replica at whatever the
//!    last applied event said. There is no ordering guarantee across events.
//!
//! Events received before a successful bootstrap trigger a bootstrap attempt
//! first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ChangeEvent, EventSubscriber, ItemPredicate, ReplicaStore, StoreReader};
use crate::error::Result;

/// How event payloads are used when applying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyMode {
    /// Write the state carried by the event; re-fetch only when it has none.
    #[default]
    TrustPayload,
    /// Always re-read the entity from the source.
    Refetch,
}

/// Result of a bootstrap call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum BootstrapOutcome {
    Copied {
        catalogs: usize,
        items: usize,
        orders: usize,
    },
    AlreadyBootstrapped,
}

/// Mirrors the authoritative store into a replica.
pub struct ReplicaSynchronizer {
    source: Arc<dyn StoreReader>,
    replica: Arc<dyn ReplicaStore>,
    mode: ApplyMode,
    bootstrapped: AtomicBool,
    bootstrap_lock: Mutex<()>,
}

impl ReplicaSynchronizer {
    pub fn new(source: Arc<dyn StoreReader>, replica: Arc<dyn ReplicaStore>) -> Self {
        Self {
            source,
            replica,
            mode: ApplyMode::default(),
            bootstrapped: AtomicBool::new(false),
            bootstrap_lock: Mutex::new(()),
        }
    }

    /// Set how event payloads are applied.
    pub fn with_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Configured apply mode.
    pub fn mode(&self) -> ApplyMode {
        self.mode
    }

    /// Whether a bootstrap has completed in this process.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    /// Copy the source into the replica, once per process.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        if self.is_bootstrapped() {
            return Ok(BootstrapOutcome::AlreadyBootstrapped);
        }

        let _guard = self.bootstrap_lock.lock().await;
        // another caller may have finished while we waited
        if self.is_bootstrapped() {
            return Ok(BootstrapOutcome::AlreadyBootstrapped);
        }

        let catalogs = self.source.list_catalogs().await?;
        let items = self.source.search_items(&ItemPredicate::All).await?;
        let orders = self.source.list_orders().await?;

        let outcome = BootstrapOutcome::Copied {
            catalogs: catalogs.len(),
            items: items.len(),
            orders: orders.len(),
        };

        for catalog in catalogs {
            self.replica.put_catalog(catalog).await?;
        }
        for item in items {
            self.replica.put_item(item).await?;
        }
        for order in orders {
            self.replica.put_order(order).await?;
        }

        self.bootstrapped.store(true, Ordering::Release);
        info!(?outcome, "Replica bootstrapped");
        Ok(outcome)
    }

    /// Fold one change event into the replica.
    pub async fn apply(&self, event: &ChangeEvent) -> Result<()> {
        let refetch = self.mode == ApplyMode::Refetch;

        match event {
            ChangeEvent::CatalogChanged { id, state, .. } => {
                let catalog = match state {
                    Some(catalog) if !refetch => catalog.clone(),
                    _ => self.source.read_catalog(*id).await?,
                };
                self.replica.put_catalog(catalog).await?;
            }
            ChangeEvent::ItemChanged { id, state, .. } => {
                let item = match state {
                    Some(item) if !refetch => item.clone(),
                    _ => self.source.read_item(*id).await?,
                };
                self.replica.put_item(item).await?;
            }
            ChangeEvent::OrderConfirmed { id, order, .. } => {
                let order = match order {
                    Some(order) if !refetch => order.clone(),
                    _ => {
                        let found = self
                            .source
                            .list_orders()
                            .await?
                            .into_iter()
                            .find(|o| o.id == *id);
                        match found {
                            Some(order) => order,
                            None => {
                                warn!(order_id = %id, "Confirmed order not found at source");
                                return Ok(());
                            }
                        }
                    }
                };
                // orders are append-only; a repeat delivery is a no-op
                let inserted = self.replica.put_order(order).await?;
                debug!(order_id = %id, inserted, "Order applied to replica");
                return Ok(());
            }
        }

        debug!(
            event_type = event.event_type(),
            entity_id = event.entity_id(),
            "Change applied to replica"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ReplicaSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaSynchronizer")
            .field("mode", &self.mode)
            .field("bootstrapped", &self.is_bootstrapped())
            .finish()
    }
}

#[async_trait]
impl EventSubscriber for ReplicaSynchronizer {
    fn name(&self) -> &str {
        "replica-synchronizer"
    }

    async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        if !self.is_bootstrapped() {
            self.bootstrap().await?;
        }
        self.apply(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::{
        AuthoritativeStore, Catalog, CatalogId, Item, ItemId, ItemUpdate, NewCatalog, NewItem,
        NewOrder, Order,
    };
    use crate::error::Error;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    async fn source() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .create_catalog(NewCatalog {
                name: "systems".into(),
            })
            .await
            .unwrap();
        for name in ["Xen", "RPCs for Noobs"] {
            store
                .create_item(NewItem {
                    name: name.into(),
                    count: 2,
                    price: 10.0,
                    catalog_id: CatalogId(1),
                })
                .await
                .unwrap();
        }
        let item = store.read_item(ItemId(1)).await.unwrap();
        store
            .record_order(NewOrder {
                item,
                purchased_at: Utc::now(),
                quantity: 1,
            })
            .await
            .unwrap();
        store
    }

    /// Fails the first `failures` catalog listings.
    struct Flaky {
        inner: Arc<InMemoryStore>,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl StoreReader for Flaky {
        async fn read_item(&self, id: ItemId) -> Result<Item> {
            self.inner.read_item(id).await
        }

        async fn read_catalog(&self, id: CatalogId) -> Result<Catalog> {
            self.inner.read_catalog(id).await
        }

        async fn search_items(&self, predicate: &ItemPredicate) -> Result<Vec<Item>> {
            self.inner.search_items(predicate).await
        }

        async fn list_catalogs(&self) -> Result<Vec<Catalog>> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::upstream("source", "connection refused"));
            }
            self.inner.list_catalogs().await
        }

        async fn list_orders(&self) -> Result<Vec<Order>> {
            self.inner.list_orders().await
        }
    }

    #[tokio::test]
    async fn test_bootstrap_copies_once() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone());

        assert_eq!(
            sync.bootstrap().await.unwrap(),
            BootstrapOutcome::Copied {
                catalogs: 1,
                items: 2,
                orders: 1
            }
        );
        assert_eq!(
            sync.bootstrap().await.unwrap(),
            BootstrapOutcome::AlreadyBootstrapped
        );
        assert_eq!(replica.counts(), (1, 2, 1));
        assert_eq!(
            replica.read_item(ItemId(2)).await.unwrap(),
            source.read_item(ItemId(2)).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_concurrent_bootstrap_copies_once() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = Arc::new(ReplicaSynchronizer::new(source, replica.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sync = sync.clone();
                tokio::spawn(async move { sync.bootstrap().await.unwrap() })
            })
            .collect();

        let mut copied = 0;
        for handle in handles {
            if let BootstrapOutcome::Copied { .. } = handle.await.unwrap() {
                copied += 1;
            }
        }

        assert_eq!(copied, 1);
        assert_eq!(replica.counts(), (1, 2, 1));
    }

    #[tokio::test]
    async fn test_failed_bootstrap_can_be_retried() {
        let flaky = Arc::new(Flaky {
            inner: source().await,
            failures: AtomicUsize::new(1),
        });
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(flaky, replica.clone());

        assert_matches!(sync.bootstrap().await, Err(Error::UpstreamUnavailable { .. }));
        assert!(!sync.is_bootstrapped());

        assert_matches!(sync.bootstrap().await, Ok(BootstrapOutcome::Copied { .. }));
        assert!(sync.is_bootstrapped());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent_and_last_wins() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone());
        sync.bootstrap().await.unwrap();

        let older = source
            .update_item(ItemId(1), ItemUpdate::AdjustStock(-1))
            .await
            .unwrap();
        let newer = source
            .update_item(ItemId(1), ItemUpdate::SetPrice(12.0))
            .await
            .unwrap();

        let newer_event = ChangeEvent::item_changed(&newer);
        sync.apply(&newer_event).await.unwrap();
        sync.apply(&newer_event).await.unwrap();
        assert_eq!(replica.read_item(ItemId(1)).await.unwrap(), newer);

        // a stale event applied late wins, being last
        sync.apply(&ChangeEvent::item_changed(&older)).await.unwrap();
        assert_eq!(replica.read_item(ItemId(1)).await.unwrap(), older);
    }

    #[tokio::test]
    async fn test_apply_refetches_without_payload() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone());

        let updated = source
            .update_item(ItemId(2), ItemUpdate::AdjustStock(5))
            .await
            .unwrap();
        sync.apply(&ChangeEvent::item_touched(ItemId(2))).await.unwrap();

        assert_eq!(replica.read_item(ItemId(2)).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_refetch_mode_ignores_payload() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone())
            .with_mode(ApplyMode::Refetch);

        let mut forged = source.read_item(ItemId(1)).await.unwrap();
        forged.count = 999;
        sync.apply(&ChangeEvent::item_changed(&forged)).await.unwrap();

        assert_eq!(replica.read_item(ItemId(1)).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_orders_inserted_once() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone());

        let order = source.list_orders().await.unwrap().remove(0);
        let event = ChangeEvent::order_confirmed(&order);
        sync.apply(&event).await.unwrap();
        sync.apply(&event).await.unwrap();

        assert_eq!(replica.list_orders().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn test_identity_only_order_is_refetched() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone());

        let event: ChangeEvent =
            serde_json::from_str(r#"{"type":"order-confirmed","id":1}"#).unwrap();
        sync.apply(&event).await.unwrap();

        assert_eq!(
            replica.list_orders().await.unwrap(),
            source.list_orders().await.unwrap()
        );

        // unknown at the source: logged and skipped
        let missing: ChangeEvent =
            serde_json::from_str(r#"{"type":"order-confirmed","id":77}"#).unwrap();
        sync.apply(&missing).await.unwrap();
        assert_eq!(replica.counts().2, 1);
    }

    #[tokio::test]
    async fn test_event_before_bootstrap_bootstraps_first() {
        let source = source().await;
        let replica = Arc::new(InMemoryStore::new());
        let sync = ReplicaSynchronizer::new(source.clone(), replica.clone());

        let catalog = source
            .create_catalog(NewCatalog {
                name: "networks".into(),
            })
            .await
            .unwrap();
        sync.handle(&ChangeEvent::catalog_changed(&catalog))
            .await
            .unwrap();

        assert!(sync.is_bootstrapped());
        assert_eq!(replica.counts(), (2, 2, 1));
    }
}
