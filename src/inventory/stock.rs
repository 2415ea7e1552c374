//! Catalog maintenance: creation, restocking and pricing

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::{
    AuthoritativeStore, Catalog, Item, ItemId, ItemUpdate, NewCatalog, NewItem,
};
use crate::error::{Error, Result};

/// Stock level of an item that can currently be bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub id: ItemId,
    pub left: u32,
}

/// Write operations on catalogs and items, other than purchases.
pub struct InventoryService {
    store: Arc<dyn AuthoritativeStore>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn AuthoritativeStore>) -> Self {
        Self { store }
    }

    pub async fn create_catalog(&self, new: NewCatalog) -> Result<Catalog> {
        let catalog = self.store.create_catalog(new).await?;
        info!(catalog_id = %catalog.id, name = %catalog.name, "Catalog created");
        Ok(catalog)
    }

    pub async fn create_item(&self, new: NewItem) -> Result<Item> {
        let item = self.store.create_item(new).await?;
        info!(item_id = %item.id, name = %item.name, count = item.count, "Item created");
        Ok(item)
    }

    /// Add `amount` units to an item's stock.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn restock(&self, id: ItemId, amount: u32) -> Result<Item> {
        let amount = positive(amount)?;
        let item = self
            .store
            .update_item(id, ItemUpdate::AdjustStock(amount))
            .await?;
        info!(item_id = %id, count = item.count, "Item restocked");
        Ok(item)
    }

    /// Remove `amount` units; rejected with `StockExhausted` if fewer remain.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn decrease_stock(&self, id: ItemId, amount: u32) -> Result<Item> {
        let amount = positive(amount)?;
        let item = self
            .store
            .update_item(id, ItemUpdate::AdjustStock(-amount))
            .await?;
        info!(item_id = %id, count = item.count, "Item stock decreased");
        Ok(item)
    }

    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn set_price(&self, id: ItemId, price: f64) -> Result<Item> {
        let item = self.store.update_item(id, ItemUpdate::SetPrice(price)).await?;
        info!(item_id = %id, price = item.price, "Item repriced");
        Ok(item)
    }

    /// Units left for an item; `StockExhausted` when there are none.
    pub async fn availability(&self, id: ItemId) -> Result<Availability> {
        let item = self.store.read_item(id).await?;
        if !item.in_stock() {
            return Err(Error::StockExhausted { item_id: id.get() });
        }
        Ok(Availability {
            id,
            left: item.count,
        })
    }
}

impl std::fmt::Debug for InventoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryService").finish_non_exhaustive()
    }
}

fn positive(amount: u32) -> Result<i64> {
    if amount == 0 {
        return Err(Error::Validation("amount must be positive".into()));
    }
    Ok(i64::from(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use crate::domain::CatalogId;
    use assert_matches::assert_matches;

    async fn service() -> InventoryService {
        let service = InventoryService::new(Arc::new(InMemoryStore::new()));
        service
            .create_catalog(NewCatalog {
                name: "networks".into(),
            })
            .await
            .unwrap();
        service
            .create_item(NewItem {
                name: "Cooking for the Impatient Graduate Student".into(),
                count: 2,
                price: 15.0,
                catalog_id: CatalogId(1),
            })
            .await
            .unwrap();
        service
    }

    #[tokio::test]
    async fn test_restock_and_decrease() {
        let service = service().await;

        assert_eq!(service.restock(ItemId(1), 3).await.unwrap().count, 5);
        assert_eq!(service.decrease_stock(ItemId(1), 5).await.unwrap().count, 0);
        assert_matches!(
            service.decrease_stock(ItemId(1), 1).await,
            Err(Error::StockExhausted { item_id: 1 })
        );
        assert_matches!(service.restock(ItemId(1), 0).await, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_availability() {
        let service = service().await;

        assert_eq!(
            service.availability(ItemId(1)).await.unwrap(),
            Availability {
                id: ItemId(1),
                left: 2
            }
        );

        service.decrease_stock(ItemId(1), 2).await.unwrap();
        assert_matches!(
            service.availability(ItemId(1)).await,
            Err(Error::StockExhausted { .. })
        );
    }

    #[tokio::test]
    async fn test_set_price() {
        let service = service().await;
        assert_eq!(service.set_price(ItemId(1), 20.0).await.unwrap().price, 20.0);
        assert_matches!(
            service.set_price(ItemId(1), -3.0).await,
            Err(Error::Validation(_))
        );
        assert_matches!(
            service.set_price(ItemId(9), 1.0).await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_create_validation() {
        let service = service().await;
        assert_matches!(
            service.create_catalog(NewCatalog { name: " ".into() }).await,
            Err(Error::Validation(_))
        );
    }
}
