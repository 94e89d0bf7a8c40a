//! Bounded local entry cache
//!
//! Eviction is recency-weighted LFU: score = `access_count /
//! (seconds_since_last_access + 1)`, lowest evicted first. A hot entry
//! read many times recently scores high; an entry untouched for an hour
//! decays toward zero no matter how popular it once was.

use crate::entry::ContextEntry;
use grc_common::AtomicCounter;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Instant;

const SHARD_COUNT: usize = 16;

struct Cached {
    entry: ContextEntry,
    access_count: u64,
    last_access: Instant,
}

impl Cached {
    fn score(&self, now: Instant) -> f64 {
        let idle_secs = now.duration_since(self.last_access).as_secs_f64();
        self.access_count as f64 / (idle_secs + 1.0)
    }
}

/// Sharded cache of context entries in their stored (possibly encrypted)
/// form
pub struct ContextCache {
    shards: Vec<Mutex<HashMap<String, Cached>>>,
    capacity: usize,
    hits: AtomicCounter,
    misses: AtomicCounter,
    evictions: AtomicCounter,
}

impl ContextCache {
    /// Create a cache bounded to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            capacity: capacity.max(1),
            hits: AtomicCounter::new(0),
            misses: AtomicCounter::new(0),
            evictions: AtomicCounter::new(0),
        }
    }

    fn shard_for(&self, entry_id: &str) -> &Mutex<HashMap<String, Cached>> {
        let mut hasher = DefaultHasher::new();
        entry_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Fetch an entry, bumping its frequency and recency
    pub fn get(&self, entry_id: &str) -> Option<ContextEntry> {
        let mut shard = self.shard_for(entry_id).lock();
        match shard.get_mut(entry_id) {
            Some(cached) => {
                cached.access_count += 1;
                cached.last_access = Instant::now();
                self.hits.inc();
                Some(cached.entry.clone())
            }
            None => {
                self.misses.inc();
                None
            }
        }
    }

    /// Insert or replace an entry, evicting the lowest-scoring resident
    /// when at capacity
    pub fn insert(&self, entry: ContextEntry) {
        let entry_id = entry.entry_id.clone();
        {
            let mut shard = self.shard_for(&entry_id).lock();
            if let Some(existing) = shard.get_mut(&entry_id) {
                existing.entry = entry;
                return;
            }
        }

        if self.len() >= self.capacity {
            self.evict_lowest();
        }

        self.shard_for(&entry_id).lock().insert(
            entry_id,
            Cached {
                entry,
                access_count: 1,
                last_access: Instant::now(),
            },
        );
    }

    /// Drop an entry
    pub fn remove(&self, entry_id: &str) {
        self.shard_for(entry_id).lock().remove(entry_id);
    }

    /// Drop entries past their expiry; returns how many were removed
    pub fn remove_expired(&self) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut guard = shard.lock();
            let before = guard.len();
            guard.retain(|_, cached| !cached.entry.is_expired());
            removed += before - guard.len();
        }
        removed
    }

    fn evict_lowest(&self) {
        let now = Instant::now();
        let mut victim: Option<(usize, String, f64)> = None;
        for (index, shard) in self.shards.iter().enumerate() {
            let guard = shard.lock();
            for (entry_id, cached) in guard.iter() {
                let score = cached.score(now);
                if victim.as_ref().map(|(_, _, best)| score < *best).unwrap_or(true) {
                    victim = Some((index, entry_id.clone(), score));
                }
            }
        }
        if let Some((index, entry_id, _)) = victim {
            self.shards[index].lock().remove(&entry_id);
            self.evictions.inc();
            tracing::debug!(%entry_id, "context cache eviction");
        }
    }

    /// Resident entry count
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses, evictions)
    pub fn stats(&self) -> (u64, u64, u64) {
        (self.hits.get(), self.misses.get(), self.evictions.get())
    }
}
