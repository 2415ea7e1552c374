//! catalog-tier - Cached, replicated catalog and order serving
//!
//! A three-tier serving layer for a catalog/ordering workload: a
//! dispatch-and-cache front tier in front of interchangeable backends, an
//! authoritative catalog/order store, and best-effort replicas kept in sync
//! through change events.
//!
//! # Architecture
//!
//! ```text
//!   client ──▶ Front Tier ──select──▶ Dispatcher ──▶ backend endpoint
//!                  │  ▲                                   │
//!                  ▼  │ miss: forward, put                ▼
//!              ResponseCache                      Authoritative Store
//!                  ▲                                      │ commit
//!                  │ invalidate                           ▼
//!           CacheInvalidator ◀──── ChangePropagator ◀── change event
//!                                        │
//!                                        ▼
//!                               ReplicaSynchronizer ──▶ Replica Store
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Port implementations (in-memory store, HTTP clients, subscribers)
//! - [`cache`] - Bounded LRU response cache and event-driven invalidation
//! - [`config`] - YAML/CLI configuration
//! - [`dispatch`] - Per-class backend endpoint selection
//! - [`domain`] - Records, change events and ports
//! - [`error`] - Error types
//! - [`front`] - Front tier request handling
//! - [`inventory`] - Purchases, restocking and pricing
//! - [`metrics`] - Prometheus metrics
//! - [`propagation`] - Change event fan-out
//! - [`replica`] - Replica bootstrap and event application
//! - [`server`] - HTTP surfaces for each role

pub mod adapters;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod front;
pub mod inventory;
pub mod metrics;
pub mod propagation;
pub mod replica;
pub mod server;

// Re-export commonly used types
pub use cache::{CacheKey, ResponseCache};
pub use config::{Role, TierConfig};
pub use dispatch::{Dispatcher, Endpoint, RequestClass, SelectionPolicy};
pub use error::{Error, Result};
pub use front::FrontTier;
pub use inventory::PurchaseService;
pub use propagation::ChangePropagator;
pub use replica::ReplicaSynchronizer;
