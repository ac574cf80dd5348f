//! Bounded per-key state storage shared by the limiters.

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

use super::key::RateLimitKey;
use crate::config::StoreConfig;

/// Limiter state plus the last time its key was seen.
#[derive(Debug)]
struct Slot<S> {
    state: S,
    last_seen: Instant,
}

/// Per-key state map with a capacity bound and idle eviction.
///
/// Each key's state is mutated while its shard's write guard is held, so a
/// read-modify-write on one key is atomic with respect to other callers on
/// the same key while unrelated keys in other shards proceed in parallel.
///
/// Recency is tracked in an LRU index capped at `max_entries`; pushing a new
/// key into a full index yields the least recently used key, which is then
/// dropped from the map. The index lock is never held together with a map
/// guard.
pub struct RateLimitStore<S> {
    entries: DashMap<RateLimitKey, Slot<S>>,
    recency: Mutex<LruCache<RateLimitKey, ()>>,
    idle_timeout: Duration,
}

impl<S> RateLimitStore<S> {
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_limits(config.max_entries, config.idle_timeout())
    }

    pub fn with_limits(max_entries: usize, idle_timeout: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: DashMap::new(),
            recency: Mutex::new(LruCache::new(capacity)),
            idle_timeout,
        }
    }

    /// Run `f` against the state for `key`, creating it with `init` first if
    /// the key is new.
    ///
    /// When the store is full, the least recently seen key is evicted to make
    /// room. Eviction runs after the new key is inserted, so racing inserts
    /// of distinct new keys may briefly overshoot the bound.
    pub fn with_entry<R>(
        &self,
        key: &RateLimitKey,
        now: Instant,
        init: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> R,
    ) -> R {
        let result = {
            let mut slot = self
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot {
                    state: init(),
                    last_seen: now,
                });

            if now > slot.last_seen {
                slot.last_seen = now;
            }
            f(&mut slot.state)
        };

        if let Some(evicted) = self.touch(key) {
            debug!(key = %evicted, "Store full, evicting least recently seen key");
            self.entries.remove(&evicted);
        }
        result
    }

    /// Mark `key` as most recently used, returning the key pushed out of a
    /// full index.
    fn touch(&self, key: &RateLimitKey) -> Option<RateLimitKey> {
        let mut recency = self.recency.lock();
        if recency.get(key).is_some() {
            return None;
        }
        recency
            .push(key.clone(), ())
            .map(|(evicted, _)| evicted)
            .filter(|evicted| evicted != key)
    }

    /// Read the state for `key` without creating or touching it.
    pub fn inspect<R>(&self, key: &RateLimitKey, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.entries.get(key).map(|slot| f(&slot.state))
    }

    /// Remove entries not seen for at least the idle timeout.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let idle_timeout = self.idle_timeout;
        let mut removed = Vec::new();
        self.entries.retain(|key, slot| {
            let keep = now.saturating_duration_since(slot.last_seen) < idle_timeout;
            if !keep {
                removed.push(key.clone());
            }
            keep
        });

        if !removed.is_empty() {
            let mut recency = self.recency.lock();
            for key in &removed {
                recency.pop(key);
            }
        }
        removed.len()
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
