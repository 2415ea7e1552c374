//! Response Cache
//!
//! Bounded LRU cache of upstream responses, keyed by request class.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Front Tier                             │
//! │   get(key) ──hit──▶ payload                                   │
//! │      │                                                        │
//! │     miss ──▶ Dispatcher ──▶ Upstream ──▶ put(key, payload)    │
//! └──────────────────────────────────────────────────────────────┘
//!                               ▲
//!               CacheInvalidator│(change events)
//!                               │
//!                       ChangePropagator
//! ```
//!
//! Losing an entry is always safe: the next read falls back to a backend
//! fetch. Two concurrent misses on one key may both fetch and both write; the
//! second write wins.

mod entry;
mod invalidator;
mod lru;

pub use entry::CacheKey;
pub use invalidator::CacheInvalidator;
pub use lru::{CacheStats, LruCache, LruConfig};

use std::sync::Arc;

/// Default number of cached responses
pub const DEFAULT_CAPACITY: usize = 1000;

/// Cached upstream payload. Shared, never mutated after insertion.
pub type Payload = Arc<serde_json::Value>;

/// The front tier's response cache.
pub type ResponseCache = LruCache<CacheKey, Payload>;
