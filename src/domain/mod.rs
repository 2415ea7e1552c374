//! Domain Layer
//!
//! # Architecture
//!
//! The domain layer is organized into:
//!
//! - **Model** (`model.rs`) - Catalog, Item and Order records plus write requests
//! - **Events** (`events.rs`) - Change events emitted after committed writes
//! - **Ports** (`ports.rs`) - Trait abstractions for stores, backends and subscribers
//!
//! # Usage
//!
//! ```ignore
//! use catalog_tier::domain::{AuthoritativeStore, ItemId, ItemUpdate};
//!
//! async fn restock<S: AuthoritativeStore>(store: &S, id: ItemId) -> Result<()> {
//!     let item = store.update_item(id, ItemUpdate::AdjustStock(1)).await?;
//!     // the store has already emitted an item-changed event
//!     Ok(())
//! }
//! ```

pub mod events;
pub mod model;
pub mod ports;

pub use events::ChangeEvent;
pub use model::{
    validate_price, Catalog, CatalogId, Item, ItemId, ItemPredicate, ItemUpdate, NewCatalog,
    NewItem, NewOrder, Order, OrderId,
};
pub use ports::{
    AuthoritativeStore, ChangeHook, EventSubscriber, ReplicaStore, StoreReader, Upstream,
    UpstreamRequest,
};
