//! catalog-tier Integration Tests
//!
//! End-to-end flows across tiers, all in one process:
//! - Front tier read-through, purchase and event-driven invalidation
//! - Per-class dispatch over several backends
//! - Replica bootstrap and catch-up through the propagator

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tokio_test::assert_ok;

use catalog_tier::adapters::{InMemoryEventCollector, InMemoryStore, LocalUpstream};
use catalog_tier::cache::{CacheInvalidator, CacheKey, ResponseCache};
use catalog_tier::domain::{
    AuthoritativeStore, CatalogId, ItemId, NewCatalog, NewItem, StoreReader,
};
use catalog_tier::front::Source;
use catalog_tier::inventory::PurchaseService;
use catalog_tier::{
    ChangePropagator, Dispatcher, Endpoint, Error, FrontTier, ReplicaSynchronizer, RequestClass,
    SelectionPolicy,
};

const WAIT: Duration = Duration::from_secs(2);

async fn seeded_store(propagator: &ChangePropagator, count: u32) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new().with_hook(Arc::new(propagator.clone())));
    assert_ok!(
        store
            .create_catalog(NewCatalog {
                name: "distributed systems".into(),
            })
            .await
    );
    assert_ok!(
        store
            .create_item(NewItem {
                name: "RPCs for Noobs".into(),
                count,
                price: 10.0,
                catalog_id: CatalogId(1),
            })
            .await
    );
    store
}

fn endpoint(address: &str) -> Endpoint {
    Endpoint::new(address).unwrap()
}

/// Poll until `condition` holds or the wait budget runs out.
async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

// =============================================================================
// Front Tier
// =============================================================================

mod front_tests {
    use super::*;

    struct Deployment {
        store: Arc<InMemoryStore>,
        purchases: Arc<PurchaseService>,
        propagator: ChangePropagator,
        front: FrontTier,
    }

    async fn deploy(count: u32) -> Deployment {
        let propagator = ChangePropagator::new();
        let store = seeded_store(&propagator, count).await;
        let purchases = Arc::new(PurchaseService::new(store.clone()));

        let backend = endpoint("http://store:8001");
        let upstream = LocalUpstream::new().with_store(
            backend.clone(),
            store.clone(),
            purchases.clone(),
        );
        let dispatcher = Dispatcher::new(SelectionPolicy::RoundRobin)
            .with_endpoints(RequestClass::Search, vec![backend.clone()])
            .with_endpoints(RequestClass::Lookup, vec![backend.clone()])
            .with_endpoints(RequestClass::Purchase, vec![backend]);
        let cache = Arc::new(ResponseCache::new(16));
        propagator.subscribe(Arc::new(CacheInvalidator::new(cache.clone())));

        let front = FrontTier::new(Arc::new(dispatcher), cache, Arc::new(upstream));
        Deployment {
            store,
            purchases,
            propagator,
            front,
        }
    }

    #[tokio::test]
    async fn test_last_unit_sold_once() {
        let deployment = deploy(1).await;
        let front = &deployment.front;

        let first = front.info(ItemId(1)).await.unwrap();
        assert_eq!(first.source, Source::Backend);
        assert_eq!(first.payload["count"], 1);
        let second = front.info(ItemId(1)).await.unwrap();
        assert_eq!(second.source, Source::Cache);

        let receipt = front.purchase(ItemId(1)).await.unwrap();
        assert_eq!(receipt["item"]["count"], 0);
        assert!(!front.cache().contains(&CacheKey::Lookup(ItemId(1))));

        let refreshed = front.info(ItemId(1)).await.unwrap();
        assert_eq!(refreshed.source, Source::Backend);
        assert_eq!(refreshed.payload["count"], 0);

        assert_matches!(
            front.purchase(ItemId(1)).await,
            Err(Error::StockExhausted { item_id: 1 })
        );
        let item = deployment.store.read_item(ItemId(1)).await.unwrap();
        assert_eq!(item.count, 0);
        assert_eq!(deployment.store.list_orders().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_side_change_invalidates_cache() {
        let deployment = deploy(5).await;
        let front = &deployment.front;
        let collector = Arc::new(InMemoryEventCollector::new());
        deployment.propagator.subscribe(collector.clone());

        front.info(ItemId(1)).await.unwrap();
        front.search("RPCs for Noobs").await.unwrap();
        assert_eq!(front.cache().len(), 2);

        // bypasses the front tier, so only the change event can clear the cache
        deployment.purchases.purchase(ItemId(1)).await.unwrap();
        assert!(collector.wait_for(2, WAIT).await);

        let cache = front.cache().clone();
        assert!(eventually(|| cache.is_empty()).await);

        let answer = front.info(ItemId(1)).await.unwrap();
        assert_eq!(answer.source, Source::Backend);
        assert_eq!(answer.payload["count"], 4);
    }

    #[tokio::test]
    async fn test_missing_item_is_not_cached() {
        let deployment = deploy(1).await;

        assert_matches!(
            deployment.front.info(ItemId(99)).await,
            Err(Error::NotFound { .. })
        );
        assert!(deployment.front.cache().is_empty());
    }
}

// =============================================================================
// Dispatch
// =============================================================================

mod dispatch_tests {
    use super::*;

    #[test]
    fn test_round_robin_alternates() {
        let a = endpoint("http://a:8000");
        let b = endpoint("http://b:8000");
        let dispatcher = Dispatcher::new(SelectionPolicy::RoundRobin)
            .with_endpoints(RequestClass::Lookup, vec![a.clone(), b.clone()]);

        let picks: Vec<Endpoint> = (0..4)
            .map(|_| dispatcher.select(RequestClass::Lookup).unwrap())
            .collect();
        assert_eq!(picks, vec![a.clone(), b.clone(), a, b]);
    }

    #[tokio::test]
    async fn test_reads_spread_over_replicas() {
        let propagator = ChangePropagator::new();
        let primary = seeded_store(&propagator, 3).await;
        let replica = Arc::new(InMemoryStore::new());
        let synchronizer = ReplicaSynchronizer::new(primary.clone(), replica.clone());
        synchronizer.bootstrap().await.unwrap();

        let a = endpoint("http://primary:8001");
        let b = endpoint("http://replica:8002");
        let upstream = Arc::new(
            LocalUpstream::new()
                .with_reader(a.clone(), primary)
                .with_reader(b.clone(), replica),
        );
        let dispatcher = Dispatcher::new(SelectionPolicy::LeastLoaded)
            .with_endpoints(RequestClass::Search, vec![a.clone(), b.clone()]);
        let front = FrontTier::new(
            Arc::new(dispatcher),
            Arc::new(ResponseCache::new(1)),
            upstream.clone(),
        );

        // a capacity-one cache keeps evicting, so every other search goes upstream
        for name in ["RPCs for Noobs", "unknown", "RPCs for Noobs", "unknown"] {
            front.search(name).await.unwrap();
        }
        assert_eq!(upstream.calls(&a), 2);
        assert_eq!(upstream.calls(&b), 2);
    }

    #[tokio::test]
    async fn test_unconfigured_class_fails() {
        let front = FrontTier::new(
            Arc::new(Dispatcher::new(SelectionPolicy::RoundRobin)),
            Arc::new(ResponseCache::new(4)),
            Arc::new(LocalUpstream::new()),
        );
        assert_matches!(front.info(ItemId(1)).await, Err(Error::Config(_)));
    }
}

// =============================================================================
// Replication
// =============================================================================

mod replica_tests {
    use super::*;

    #[tokio::test]
    async fn test_replica_follows_purchases() {
        let propagator = ChangePropagator::new();
        let primary = seeded_store(&propagator, 2).await;
        let replica = Arc::new(InMemoryStore::new());

        let synchronizer = Arc::new(ReplicaSynchronizer::new(primary.clone(), replica.clone()));
        assert_ok!(synchronizer.bootstrap().await);
        propagator.subscribe(synchronizer.clone());

        let purchases = PurchaseService::new(primary.clone());
        purchases.purchase(ItemId(1)).await.unwrap();

        let caught_up = eventually(|| replica.counts().2 == 1).await;
        assert!(caught_up, "replica never saw the order");

        let mirrored = replica.read_item(ItemId(1)).await.unwrap();
        assert_eq!(mirrored, primary.read_item(ItemId(1)).await.unwrap());
        assert_eq!(mirrored.count, 1);
        assert_eq!(
            replica.list_orders().await.unwrap(),
            primary.list_orders().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_late_replica_bootstraps_on_first_event() {
        let propagator = ChangePropagator::new();
        let primary = seeded_store(&propagator, 2).await;
        let replica = Arc::new(InMemoryStore::new());

        let synchronizer = Arc::new(ReplicaSynchronizer::new(primary.clone(), replica.clone()));
        propagator.subscribe(synchronizer.clone());
        assert!(!synchronizer.is_bootstrapped());

        primary
            .create_catalog(NewCatalog {
                name: "graduate school".into(),
            })
            .await
            .unwrap();

        assert!(eventually(|| synchronizer.is_bootstrapped()).await);
        assert!(eventually(|| replica.counts() == (2, 1, 0)).await);
    }
}
