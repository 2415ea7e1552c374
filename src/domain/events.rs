//! Change Events
//!
//! Notifications describing a committed mutation in the authoritative store.
//! They are transient messages: never stored, never deduplicated, delivered
//! at most once to whoever is subscribed at publish time.
//!
//! # Wire format
//!
//! Events serialize as a JSON object with a `type` discriminant and an `id`:
//!
//! ```text
//! {"type":"item-changed","id":1,"state":{"id":1,"name":"...","count":0,...},"emitted_at":"..."}
//! ```
//!
//! Everything beyond `type` and `id` is advisory. Consumers that do not trust
//! the payload (or receive an event without one) re-fetch from the source.
//! Payloads always carry the absolute resulting state, never a delta, so
//! applying the same event twice leaves a replica where one application would.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Catalog, CatalogId, Item, ItemId, Order, OrderId};

/// A committed change to a catalog, item, or order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChangeEvent {
    /// A catalog was created or renamed.
    CatalogChanged {
        id: CatalogId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<Catalog>,
        #[serde(default = "Utc::now")]
        emitted_at: DateTime<Utc>,
    },

    /// An item was created, restocked, sold, or repriced.
    ItemChanged {
        id: ItemId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<Item>,
        #[serde(default = "Utc::now")]
        emitted_at: DateTime<Utc>,
    },

    /// A purchase committed and an order was recorded.
    OrderConfirmed {
        id: OrderId,
        /// Purchased item; peers may omit it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<ItemId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order: Option<Order>,
        #[serde(default = "Utc::now")]
        emitted_at: DateTime<Utc>,
    },
}

impl ChangeEvent {
    /// Get the event type name (the wire discriminant).
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::CatalogChanged { .. } => "catalog-changed",
            ChangeEvent::ItemChanged { .. } => "item-changed",
            ChangeEvent::OrderConfirmed { .. } => "order-confirmed",
        }
    }

    /// Raw identity of the entity the event is about.
    pub fn entity_id(&self) -> u64 {
        match self {
            ChangeEvent::CatalogChanged { id, .. } => id.get(),
            ChangeEvent::ItemChanged { id, .. } => id.get(),
            ChangeEvent::OrderConfirmed { id, .. } => id.get(),
        }
    }

    /// Item whose externally visible state this event changes, if known.
    ///
    /// An order-confirmed event sent with only `type` and `id` names no item.
    pub fn item_id(&self) -> Option<ItemId> {
        match self {
            ChangeEvent::ItemChanged { id, .. } => Some(*id),
            ChangeEvent::OrderConfirmed { item_id, order, .. } => {
                item_id.or_else(|| order.as_ref().map(|o| o.item.id))
            }
            ChangeEvent::CatalogChanged { .. } => None,
        }
    }

    /// Get the timestamp of the event.
    pub fn emitted_at(&self) -> DateTime<Utc> {
        match self {
            ChangeEvent::CatalogChanged { emitted_at, .. } => *emitted_at,
            ChangeEvent::ItemChanged { emitted_at, .. } => *emitted_at,
            ChangeEvent::OrderConfirmed { emitted_at, .. } => *emitted_at,
        }
    }

    /// Whether the event carries the entity's new state.
    pub fn has_payload(&self) -> bool {
        match self {
            ChangeEvent::CatalogChanged { state, .. } => state.is_some(),
            ChangeEvent::ItemChanged { state, .. } => state.is_some(),
            ChangeEvent::OrderConfirmed { order, .. } => order.is_some(),
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl ChangeEvent {
    /// Create a CatalogChanged event carrying the catalog's current state.
    pub fn catalog_changed(catalog: &Catalog) -> Self {
        ChangeEvent::CatalogChanged {
            id: catalog.id,
            state: Some(catalog.clone()),
            emitted_at: Utc::now(),
        }
    }

    /// Create an ItemChanged event carrying the item's current state.
    pub fn item_changed(item: &Item) -> Self {
        ChangeEvent::ItemChanged {
            id: item.id,
            state: Some(item.clone()),
            emitted_at: Utc::now(),
        }
    }

    /// Create an OrderConfirmed event for a recorded order.
    pub fn order_confirmed(order: &Order) -> Self {
        ChangeEvent::OrderConfirmed {
            id: order.id,
            item_id: Some(order.item.id),
            order: Some(order.clone()),
            emitted_at: Utc::now(),
        }
    }

    /// Identity-only ItemChanged, for peers that will re-fetch.
    pub fn item_touched(id: ItemId) -> Self {
        ChangeEvent::ItemChanged {
            id,
            state: None,
            emitted_at: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
