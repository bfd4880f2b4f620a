//! Timed cache keyed by both a name and a numeric id.
//!
//! Entities are looked up by path (`alice/phone`) as often as by id, so each
//! entry may carry one name. A name points at most at one id and an id has at
//! most one name. Entries expire after a fixed time to live, checked on every
//! read, and the least recently used entry is evicted when the cache is full.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct CacheEntry<V> {
    value: V,
    name: Option<String>,
    loaded_at: Instant,
    /// Access tick of the last hit, for LRU eviction.
    last_used: AtomicU64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, name: Option<String>, tick: u64) -> Self {
        Self {
            value,
            name,
            loaded_at: Instant::now(),
            last_used: AtomicU64::new(tick),
        }
    }

    fn touch(&self, tick: u64) {
        self.last_used.store(tick, AtomicOrdering::Relaxed);
    }

    fn last_used(&self) -> u64 {
        self.last_used.load(AtomicOrdering::Relaxed)
    }
}

struct CacheInner<V> {
    entries: HashMap<i64, CacheEntry<V>>,
    names: HashMap<String, i64>,
}

impl<V> CacheInner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            names: HashMap::new(),
        }
    }

    /// Remove an entry and the name pointing at it.
    fn remove_entry(&mut self, id: i64) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                if let Some(name) = entry.name {
                    if self.names.get(&name) == Some(&id) {
                        self.names.remove(&name);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Drop a name mapping and clear it from the entry it pointed at.
    fn unlink(&mut self, name: &str) -> Option<i64> {
        let id = self.names.remove(name)?;
        if let Some(entry) = self.entries.get_mut(&id) {
            if entry.name.as_deref() == Some(name) {
                entry.name = None;
            }
        }
        Some(id)
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Entries removed because of capacity or expiry.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Hit rate between 0.0 and 1.0.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    fn hit(&self) {
        self.hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn evicted(&self) {
        self.evictions.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// Bounded name/id cache with expiry.
///
/// Reads share a read lock; every mutation takes the write lock.
pub struct TimedCache<V> {
    inner: RwLock<CacheInner<V>>,
    capacity: usize,
    ttl: Duration,
    clock: AtomicU64,
    stats: CacheStats,
}

impl<V: Clone> TimedCache<V> {
    /// Create a cache holding at most `capacity` entries (at least one) for
    /// `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(CacheInner::new()),
            capacity: capacity.max(1),
            ttl,
            clock: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, AtomicOrdering::Relaxed) + 1
    }

    fn is_expired(&self, entry: &CacheEntry<V>) -> bool {
        entry.loaded_at.elapsed() >= self.ttl
    }

    /// Insert a value under both a name and an id.
    ///
    /// Any other id previously holding `name` loses it, and any other name
    /// previously pointing at `id` is dropped.
    pub fn set(&self, name: &str, id: i64, value: V) {
        let tick = self.tick();
        let mut inner = self.inner.write();

        let previous = inner.names.get(name).copied();
        if previous.is_some_and(|previous| previous != id) {
            inner.unlink(name);
        }
        if let Some(old_name) = inner.entries.get(&id).and_then(|e| e.name.clone()) {
            if old_name != name {
                inner.names.remove(&old_name);
            }
        }

        if !inner.entries.contains_key(&id) {
            self.make_room(&mut inner);
        }
        inner
            .entries
            .insert(id, CacheEntry::new(value, Some(name.to_string()), tick));
        inner.names.insert(name.to_string(), id);
    }

    /// Insert a value by id only. An existing name for the id is dropped.
    pub fn set_id(&self, id: i64, value: V) {
        let tick = self.tick();
        let mut inner = self.inner.write();

        if let Some(old_name) = inner.entries.get(&id).and_then(|e| e.name.clone()) {
            inner.unlink(&old_name);
        }
        if !inner.entries.contains_key(&id) {
            self.make_room(&mut inner);
        }
        inner.entries.insert(id, CacheEntry::new(value, None, tick));
    }

    /// Replace the value for an id, keeping its name. Inserts without a name
    /// when the id is not cached.
    pub fn update(&self, id: i64, value: V) {
        let tick = self.tick();
        let mut inner = self.inner.write();

        let name = inner.entries.get(&id).and_then(|e| e.name.clone());
        if !inner.entries.contains_key(&id) {
            self.make_room(&mut inner);
        }
        inner.entries.insert(id, CacheEntry::new(value, name, tick));
    }

    /// Look up a value by name.
    pub fn get_by_name(&self, name: &str) -> Option<V> {
        let id = {
            let inner = self.inner.read();
            let id = match inner.names.get(name) {
                Some(&id) => id,
                None => {
                    self.stats.miss();
                    return None;
                }
            };
            match inner.entries.get(&id) {
                Some(entry) if !self.is_expired(entry) => {
                    entry.touch(self.tick());
                    self.stats.hit();
                    return Some(entry.value.clone());
                }
                _ => id,
            }
        };

        self.expire(id);
        self.stats.miss();
        None
    }

    /// Look up a value by id, with its current name if it has one.
    pub fn get_by_id(&self, id: i64) -> Option<(V, Option<String>)> {
        {
            let inner = self.inner.read();
            match inner.entries.get(&id) {
                Some(entry) if !self.is_expired(entry) => {
                    entry.touch(self.tick());
                    self.stats.hit();
                    return Some((entry.value.clone(), entry.name.clone()));
                }
                Some(_) => {}
                None => {
                    self.stats.miss();
                    return None;
                }
            }
        }

        self.expire(id);
        self.stats.miss();
        None
    }

    /// Remove an entry by id, along with its name.
    pub fn remove_id(&self, id: i64) {
        self.inner.write().remove_entry(id);
    }

    /// Remove the entry a name points at, along with the name.
    pub fn remove_name(&self, name: &str) {
        let mut inner = self.inner.write();
        if let Some(id) = inner.names.remove(name) {
            inner.remove_entry(id);
        }
    }

    /// Forget a name while keeping the entry reachable by id.
    pub fn unlink_name(&self, name: &str) {
        self.inner.write().unlink(name);
    }

    /// Forget every name starting with `prefix`. Entries stay reachable by id.
    pub fn unlink_name_prefix(&self, prefix: &str) {
        let mut inner = self.inner.write();
        let names: Vec<String> = inner
            .names
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        for name in &names {
            inner.unlink(name);
        }
        tracing::trace!(prefix, unlinked = names.len(), "unlinked cache names");
    }

    /// Remove everything.
    pub fn purge(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.names.clear();
    }

    /// Forget every name, keeping entries reachable by id.
    pub fn purge_names(&self) {
        let mut inner = self.inner.write();
        inner.names.clear();
        for entry in inner.entries.values_mut() {
            entry.name = None;
        }
    }

    /// Remove an entry found expired under the read lock, unless it was
    /// refreshed in the meantime.
    fn expire(&self, id: i64) {
        let mut inner = self.inner.write();
        let expired = inner
            .entries
            .get(&id)
            .map(|entry| self.is_expired(entry))
            .unwrap_or(false);
        if expired {
            inner.remove_entry(id);
            self.stats.evicted();
        }
    }

    fn make_room(&self, inner: &mut CacheInner<V>) {
        while inner.entries.len() >= self.capacity {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used())
                .map(|(id, _)| *id);
            match victim {
                Some(id) => {
                    inner.remove_entry(id);
                    self.stats.evicted();
                }
                None => break,
            }
        }
    }
}
