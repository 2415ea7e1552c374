//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  StoreReader │ AuthoritativeStore │ ReplicaStore │ Upstream │ │
//! │  │  EventSubscriber                                            │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryStore │ HttpStoreReader │ HttpUpstream             │ │
//! │  │ LocalUpstream │ LoggingSubscriber │ HttpEventForwarder     │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use catalog_tier::adapters::{HttpUpstream, InMemoryStore};
//! use catalog_tier::domain::{StoreReader, Upstream};
//!
//! let store = InMemoryStore::new().with_hook(propagator.clone());
//! let item = store.read_item(ItemId(1)).await?;
//!
//! let upstream = HttpUpstream::new(Duration::from_secs(5))?;
//! let payload = upstream.call(&endpoint, &UpstreamRequest::Lookup { id }).await?;
//! ```

mod event_subscribers;
mod http_store;
mod http_upstream;
mod local_upstream;
mod memory_store;

pub use event_subscribers::{HttpEventForwarder, InMemoryEventCollector, LoggingSubscriber};
pub use http_store::HttpStoreReader;
pub use http_upstream::HttpUpstream;
pub use local_upstream::LocalUpstream;
pub use memory_store::InMemoryStore;
