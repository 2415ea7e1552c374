//! In-memory catalog/order store
//!
//! Serves both as the authoritative store (ids assigned here, every commit
//! announced through the emission hook) and as a replica (rows written with
//! upstream ids, nothing announced).
//!
//! All writes take one write lock over the whole state, so a check-then-write
//! such as the purchase stock guard is a single atomic step. The hook is
//! invoked before that lock is released, which makes event order match commit
//! order for writes to the same item.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{
    AuthoritativeStore, Catalog, CatalogId, ChangeEvent, ChangeHook, Item, ItemId, ItemPredicate,
    ItemUpdate, NewCatalog, NewItem, NewOrder, Order, OrderId, ReplicaStore, StoreReader,
};
use crate::error::{Error, Result};

#[derive(Debug)]
struct StoreState {
    catalogs: BTreeMap<CatalogId, Catalog>,
    items: BTreeMap<ItemId, Item>,
    orders: BTreeMap<OrderId, Order>,
    next_catalog: u64,
    next_item: u64,
    next_order: u64,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            catalogs: BTreeMap::new(),
            items: BTreeMap::new(),
            orders: BTreeMap::new(),
            next_catalog: 1,
            next_item: 1,
            next_order: 1,
        }
    }
}

/// Thread-safe in-memory store.
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    hook: Option<Arc<dyn ChangeHook>>,
}

impl InMemoryStore {
    /// Create an empty store that announces nothing.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            hook: None,
        }
    }

    /// Attach the hook invoked after each committed authoritative write.
    pub fn with_hook(mut self, hook: Arc<dyn ChangeHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Number of (catalogs, items, orders) currently held.
    pub fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.read();
        (state.catalogs.len(), state.items.len(), state.orders.len())
    }

    fn emit(&self, event: ChangeEvent) {
        if let Some(hook) = &self.hook {
            hook.on_change(event);
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (catalogs, items, orders) = self.counts();
        f.debug_struct("InMemoryStore")
            .field("catalogs", &catalogs)
            .field("items", &items)
            .field("orders", &orders)
            .field("announces", &self.hook.is_some())
            .finish()
    }
}

#[async_trait]
impl StoreReader for InMemoryStore {
    async fn read_item(&self, id: ItemId) -> Result<Item> {
        self.state
            .read()
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::item_not_found(id.get()))
    }

    async fn read_catalog(&self, id: CatalogId) -> Result<Catalog> {
        self.state
            .read()
            .catalogs
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::catalog_not_found(id.get()))
    }

    async fn search_items(&self, predicate: &ItemPredicate) -> Result<Vec<Item>> {
        Ok(self
            .state
            .read()
            .items
            .values()
            .filter(|item| predicate.matches(item))
            .cloned()
            .collect())
    }

    async fn list_catalogs(&self) -> Result<Vec<Catalog>> {
        Ok(self.state.read().catalogs.values().cloned().collect())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(self.state.read().orders.values().cloned().collect())
    }
}

#[async_trait]
impl AuthoritativeStore for InMemoryStore {
    async fn create_catalog(&self, new: NewCatalog) -> Result<Catalog> {
        new.validate()?;

        let mut state = self.state.write();
        let catalog = Catalog {
            id: CatalogId(state.next_catalog),
            name: new.name,
        };
        state.next_catalog += 1;
        state.catalogs.insert(catalog.id, catalog.clone());

        debug!(catalog_id = %catalog.id, "Catalog created");
        self.emit(ChangeEvent::catalog_changed(&catalog));
        Ok(catalog)
    }

    async fn create_item(&self, new: NewItem) -> Result<Item> {
        new.validate()?;

        let mut state = self.state.write();
        if !state.catalogs.contains_key(&new.catalog_id) {
            return Err(Error::catalog_not_found(new.catalog_id.get()));
        }

        let item = Item {
            id: ItemId(state.next_item),
            name: new.name,
            count: new.count,
            price: new.price,
            catalog_id: new.catalog_id,
        };
        state.next_item += 1;
        state.items.insert(item.id, item.clone());

        debug!(item_id = %item.id, "Item created");
        self.emit(ChangeEvent::item_changed(&item));
        Ok(item)
    }

    async fn update_item(&self, id: ItemId, update: ItemUpdate) -> Result<Item> {
        let mut state = self.state.write();
        let current = state
            .items
            .get(&id)
            .ok_or_else(|| Error::item_not_found(id.get()))?;

        let next = update.apply(current)?;
        state.items.insert(id, next.clone());

        debug!(item_id = %id, ?update, count = next.count, "Item updated");
        self.emit(ChangeEvent::item_changed(&next));
        Ok(next)
    }

    async fn record_order(&self, new: NewOrder) -> Result<Order> {
        if new.quantity == 0 {
            return Err(Error::Validation("order quantity must be positive".into()));
        }

        let mut state = self.state.write();
        let order = Order {
            id: OrderId(state.next_order),
            item: new.item,
            purchased_at: new.purchased_at,
            quantity: new.quantity,
        };
        state.next_order += 1;
        state.orders.insert(order.id, order.clone());

        debug!(order_id = %order.id, item_id = %order.item.id, "Order recorded");
        self.emit(ChangeEvent::order_confirmed(&order));
        Ok(order)
    }
}

#[async_trait]
impl ReplicaStore for InMemoryStore {
    async fn put_catalog(&self, catalog: Catalog) -> Result<()> {
        let mut state = self.state.write();
        state.next_catalog = state.next_catalog.max(catalog.id.get() + 1);
        state.catalogs.insert(catalog.id, catalog);
        Ok(())
    }

    async fn put_item(&self, item: Item) -> Result<()> {
        let mut state = self.state.write();
        state.next_item = state.next_item.max(item.id.get() + 1);
        state.items.insert(item.id, item);
        Ok(())
    }

    async fn put_order(&self, order: Order) -> Result<bool> {
        let mut state = self.state.write();
        if state.orders.contains_key(&order.id) {
            return Ok(false);
        }
        state.next_order = state.next_order.max(order.id.get() + 1);
        state.orders.insert(order.id, order);
        Ok(true)
    }
}
