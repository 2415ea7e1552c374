//! LRU Cache - bounded in-memory response cache
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the map and the recency index together, so
//!   lookup-and-touch and insert-and-evict are atomic as a unit
//! - Recency is a monotonically increasing tick per access; the smallest tick
//!   in the index is the least recently used entry
//! - Values are replaced wholesale and handed out by clone, so a reader never
//!   sees a value that is halfway through being updated
//! - Optional TTL; expired entries read as absent and are purged lazily

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::DEFAULT_CAPACITY;

/// LRU cache configuration
#[derive(Debug, Clone)]
pub struct LruConfig {
    /// Maximum number of entries
    pub capacity: usize,
    /// Time-to-live per entry (None = entries never expire)
    pub ttl: Option<Duration>,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: None,
        }
    }
}

struct Slot<V> {
    value: V,
    tick: u64,
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct LruState<K, V> {
    entries: HashMap<K, Slot<V>>,
    /// tick -> key, oldest first
    recency: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K: Eq + Hash + Clone, V> LruState<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Mark `key` most recently used.
    fn touch(&mut self, key: &K) {
        let tick = self.bump();
        if let Some(slot) = self.entries.get_mut(key) {
            self.recency.remove(&slot.tick);
            slot.tick = tick;
            self.recency.insert(tick, key.clone());
        }
    }

    fn remove(&mut self, key: &K) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot)
    }

    /// Drop every expired entry; returns how many went.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn pop_lru(&mut self) -> Option<(K, Slot<V>)> {
        let (_, key) = self.recency.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, slot))
    }
}

/// Bounded least-recently-used cache, safe to share across tasks.
pub struct LruCache<K, V> {
    state: Mutex<LruState<K, V>>,
    config: LruConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    expirations: AtomicU64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self::with_config(LruConfig {
            capacity,
            ..Default::default()
        })
    }

    /// Create a cache with custom configuration. A zero capacity is raised to 1.
    pub fn with_config(mut config: LruConfig) -> Self {
        config.capacity = config.capacity.max(1);
        Self {
            state: Mutex::new(LruState::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get a value and mark it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            Some(slot) => slot.is_expired(now),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            state.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        state.touch(key);
        self.hits.fetch_add(1, Ordering::Relaxed);
        state.entries.get(key).map(|slot| slot.value.clone())
    }

    /// Insert or replace a value.
    ///
    /// When the cache is full and `key` is new, expired entries are purged
    /// first; if that frees nothing, the least recently used entry is evicted
    /// and its key returned.
    pub fn put(&self, key: K, value: V) -> Option<K> {
        let now = Instant::now();
        let expires_at = self.config.ttl.map(|ttl| now + ttl);
        let mut state = self.state.lock();

        state.remove(&key);

        // expired entries make room before any live one is evicted
        if self.config.ttl.is_some() && state.entries.len() >= self.config.capacity {
            let purged = state.purge_expired(now);
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        }

        let mut evicted = None;
        if state.entries.len() >= self.config.capacity {
            if let Some((old_key, _)) = state.pop_lru() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                evicted = Some(old_key);
            }
        }

        let tick = state.bump();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            Slot {
                value,
                tick,
                expires_at,
            },
        );

        evicted
    }

    /// Remove a key. Absent keys are a no-op; returns whether anything was removed.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.state.lock().remove(key).is_some();
        if removed {
            self.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every key matching `predicate`; returns how many were removed.
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut state = self.state.lock();
        let doomed: Vec<K> = state
            .entries
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();

        for key in &doomed {
            state.remove(key);
        }

        self.invalidations
            .fetch_add(doomed.len() as u64, Ordering::Relaxed);
        doomed.len()
    }

    /// Purge expired entries and trim to capacity. Returns entries removed.
    pub fn evict_as_needed(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();

        let expired = state.purge_expired(now);
        self.expirations.fetch_add(expired as u64, Ordering::Relaxed);

        let mut trimmed = 0;
        while state.entries.len() > self.config.capacity {
            if state.pop_lru().is_none() {
                break;
            }
            trimmed += 1;
        }
        self.evictions.fetch_add(trimmed as u64, Ordering::Relaxed);

        expired + trimmed
    }

    /// Snapshot of live entries, most recently used first. Does not touch recency.
    pub fn list_entries(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .recency
            .values()
            .rev()
            .filter_map(|key| {
                let slot = state.entries.get(key)?;
                (!slot.is_expired(now)).then(|| (key.clone(), slot.value.clone()))
            })
            .collect()
    }

    /// Check if the cache holds a live entry for `key` without touching recency.
    pub fn contains(&self, key: &K) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now))
    }

    /// Number of stored entries (including expired ones not yet purged)
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Entry lifetime, if entries expire.
    pub fn ttl(&self) -> Option<Duration> {
        self.config.ttl
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lookups that found nothing live.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Hits over all lookups; 0.0 before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Live entries dropped to stay within capacity.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries removed by `invalidate` or `invalidate_where`.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity(),
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            evictions: self.evictions(),
            invalidations: self.invalidations(),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    pub evictions: u64,
    pub invalidations: u64,
    pub expirations: u64,
}

// =============================================================================
// Tests
// =============================================================================
