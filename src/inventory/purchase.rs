//! Purchase state machine
//!
//! ```text
//!               guard: count > 0
//!   Available ──────────────────▶ Reserved ──────────▶ Confirmed
//!       │                       (count - 1)         (order recorded)
//!       │ guard fails
//!       ▼
//!   Rejected  (StockExhausted, nothing written, nothing emitted)
//! ```
//!
//! The reservation is the store's atomic decrement, so two concurrent
//! purchases of the last unit cannot both pass the guard. Confirmation appends
//! the order. The store emits item-changed on the decrement and
//! order-confirmed on the append.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::domain::{AuthoritativeStore, Item, ItemId, ItemUpdate, NewOrder, Order};
use crate::error::{Error, Result};

/// Lifecycle of a single purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PurchaseState {
    Available,
    Reserved,
    Confirmed,
    Rejected,
}

impl PurchaseState {
    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub fn transition(self, next: PurchaseState) -> Result<PurchaseState> {
        use PurchaseState::*;
        match (self, next) {
            (Available, Reserved) | (Reserved, Confirmed) | (Available, Rejected) => Ok(next),
            (from, to) => Err(Error::Internal(format!(
                "invalid purchase transition {:?} -> {:?}",
                from, to
            ))),
        }
    }

    /// Whether no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, PurchaseState::Confirmed | PurchaseState::Rejected)
    }
}

/// Outcome of a confirmed purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub state: PurchaseState,
    /// Item after the decrement
    pub item: Item,
    pub order: Order,
}

/// Executes purchases against the authoritative store.
pub struct PurchaseService {
    store: Arc<dyn AuthoritativeStore>,
}

impl PurchaseService {
    pub fn new(store: Arc<dyn AuthoritativeStore>) -> Self {
        Self { store }
    }

    /// Buy one unit of an item.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn purchase(&self, id: ItemId) -> Result<PurchaseReceipt> {
        let state = PurchaseState::Available;

        let item = match self.store.update_item(id, ItemUpdate::AdjustStock(-1)).await {
            Ok(item) => item,
            Err(e @ Error::StockExhausted { .. }) => {
                state.transition(PurchaseState::Rejected)?;
                info!(item_id = %id, "Purchase rejected: out of stock");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let state = state.transition(PurchaseState::Reserved)?;

        let order = self
            .store
            .record_order(NewOrder {
                item: item.clone(),
                purchased_at: Utc::now(),
                quantity: 1,
            })
            .await
            .map_err(|e| {
                // the decrement stays committed; cross-write atomicity is not provided
                error!(item_id = %id, error = %e, "Stock reserved but order not recorded");
                e
            })?;
        let state = state.transition(PurchaseState::Confirmed)?;

        info!(
            item_id = %id,
            order_id = %order.id,
            item_name = %item.name,
            left_in_stock = item.count,
            "Purchase confirmed"
        );

        Ok(PurchaseReceipt { state, item, order })
    }
}

impl std::fmt::Debug for PurchaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseService").finish_non_exhaustive()
    }
}
