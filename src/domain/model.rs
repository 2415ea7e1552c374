//! Catalog, Item and Order records
//!
//! These are the entities owned by the authoritative store. Everything else in
//! the crate (cache payloads, replica rows, change events) is derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                s.parse::<u64>().map(Self).map_err(|_| {
                    Error::Validation(format!(
                        "{} must be a non-negative integer, got '{}'",
                        stringify!($name),
                        s
                    ))
                })
            }
        }
    };
}

id_type!(
    /// Item identifier (immutable once assigned).
    ItemId
);
id_type!(
    /// Catalog identifier.
    CatalogId
);
id_type!(
    /// Order identifier.
    OrderId
);

// =============================================================================
// Entities
// =============================================================================

/// A catalog groups items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: CatalogId,
    pub name: String,
}

/// A purchasable item.
///
/// `count` is unsigned, so a negative stock level cannot be represented;
/// decrements that would cross zero are rejected by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub count: u32,
    pub price: f64,
    pub catalog_id: CatalogId,
}

impl Item {
    /// Whether a purchase would currently pass the stock guard.
    pub fn in_stock(&self) -> bool {
        self.count > 0
    }
}

/// A confirmed purchase. Orders are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Item as it looked right after the purchase committed
    pub item: Item,
    pub purchased_at: DateTime<Utc>,
    pub quantity: u32,
}

// =============================================================================
// Write Requests
// =============================================================================

/// Input for creating a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCatalog {
    pub name: String,
}

impl NewCatalog {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("catalog name must not be empty".into()));
        }
        Ok(())
    }
}

/// Input for creating an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub price: f64,
    pub catalog_id: CatalogId,
}

fn default_count() -> u32 {
    1
}

impl NewItem {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("item name must not be empty".into()));
        }
        validate_price(self.price)
    }
}

/// Input for recording an order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub item: Item,
    pub purchased_at: DateTime<Utc>,
    pub quantity: u32,
}

/// Mutation applied to a single item under the store's write lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ItemUpdate {
    /// Add `delta` to the stock count; negative values decrement.
    AdjustStock(i64),
    /// Replace the price.
    SetPrice(f64),
}

impl ItemUpdate {
    /// Apply to an item, producing the new state. The input is left untouched
    /// so a rejected update never leaves a half-written record behind.
    pub fn apply(&self, item: &Item) -> Result<Item> {
        let mut next = item.clone();
        match *self {
            ItemUpdate::AdjustStock(delta) => {
                let target = i64::from(item.count) + delta;
                if target < 0 {
                    return Err(Error::StockExhausted {
                        item_id: item.id.get(),
                    });
                }
                next.count = u32::try_from(target).map_err(|_| {
                    Error::Validation(format!("stock count {} out of range", target))
                })?;
            }
            ItemUpdate::SetPrice(price) => {
                validate_price(price)?;
                next.price = price;
            }
        }
        Ok(next)
    }
}

/// Prices must be finite and non-negative.
pub fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(Error::Validation(format!(
            "price must be a non-negative number, got {}",
            price
        )));
    }
    Ok(())
}

// =============================================================================
// Queries
// =============================================================================

/// Predicate used by `search`.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemPredicate {
    /// Every item
    All,
    /// Exact name match (the front tier's item-type search)
    NameEquals(String),
    /// Case-insensitive substring match on the name
    NameContains(String),
    /// Items belonging to a catalog
    InCatalog(CatalogId),
}

impl ItemPredicate {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            ItemPredicate::All => true,
            ItemPredicate::NameEquals(name) => item.name == *name,
            ItemPredicate::NameContains(needle) => item
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            ItemPredicate::InCatalog(catalog_id) => item.catalog_id == *catalog_id,
        }
    }
}
