//! Bounded, TTL-based key → value cache.
//!
//! Shared by the lookup engine (forward results) and the orchestrator
//! (final translation results). Entries expire after their TTL; when the
//! cache is full, expired entries are purged first and then the least
//! recently used entry is evicted.
//!
//! The cache is owned by whoever constructs it and shared through `Arc`;
//! there is no process-wide instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// A cached value with its insertion time and time-to-live.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

struct Slot<V> {
    entry: CacheEntry<V>,
    /// Position in `Inner::order`.
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<String, Slot<V>>,
    /// Recency order keyed by a monotonic sequence; lowest is least recently used.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn touch(&mut self, key: &str) {
        let seq = self.bump();
        if let Some(slot) = self.entries.get_mut(key) {
            if let Some(k) = self.order.remove(&slot.seq) {
                self.order.insert(seq, k);
            }
            slot.seq = seq;
        }
    }

    fn push(&mut self, entry: CacheEntry<V>) {
        let seq = self.bump();
        self.order.insert(seq, entry.key.clone());
        self.entries.insert(entry.key.clone(), Slot { entry, seq });
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.entry)
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, oldest)) => {
                self.entries.remove(&oldest);
                true
            }
            None => false,
        }
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|s| s.entry.is_expired(now))
            .map(|s| s.entry.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }
}

/// Bounded LRU cache with per-entry TTL.
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            default_ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the value for `key` if present and unexpired, marking it recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            Some(slot) => slot.entry.is_expired(now),
            None => return None,
        };
        if expired {
            inner.remove(key);
            return None;
        }
        inner.touch(key);
        inner.entries.get(key).map(|s| s.entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut inner = self.lock();
        inner.remove(&key);
        inner.push(CacheEntry {
            key,
            value,
            inserted_at: now,
            ttl,
        });

        if inner.entries.len() > self.capacity {
            inner.purge_expired(now);
        }
        while inner.entries.len() > self.capacity && inner.evict_oldest() {}
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key).map(|e| e.value)
    }

    /// Drop every entry (e.g. after the override snapshot changes).
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Remove expired entries now; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    /// Number of stored entries, including any not yet purged after expiry.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }
}
