//! Write-side operations of the authoritative tier

mod purchase;
mod stock;

pub use purchase::{PurchaseReceipt, PurchaseService, PurchaseState};
pub use stock::{Availability, InventoryService};
