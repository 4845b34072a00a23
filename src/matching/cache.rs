//! Optional score side-table
//!
//! Memoizes `(query content, candidate content, scorer)` → score. Keys are
//! content fingerprints, so one cache can be shared between scans of
//! different histories and instruments through an `Arc` owned by the caller.
//! Backed by a sharded [`DashMap`] so rayon workers do not serialize on one
//! lock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{ScorerId, OHLCV};

/// Identity of one cached comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// [`window_fingerprint`] of the query
    pub query: u64,
    /// [`window_fingerprint`] of the candidate window
    pub candidate: u64,
    pub scorer: ScorerId,
}

/// Bounded concurrent score cache
#[derive(Debug)]
pub struct ScoreCache {
    capacity: usize,
    entries: DashMap<CacheKey, f64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ScoreCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &CacheKey) -> Option<f64> {
        let found = self.entries.get(key).map(|score| *score);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Insert a score. At capacity an arbitrary entry is evicted first.
    pub fn insert(&self, key: CacheKey, score: f64) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            // Guard from `iter()` must be released before `remove` locks the shard.
            let victim = self.entries.iter().next().map(|entry| *entry.key());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key, score);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Content fingerprint of a window, stable across calls with the same bars
pub fn window_fingerprint<T: OHLCV>(bars: &[T]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bars.len().hash(&mut hasher);
    for bar in bars {
        bar.open().to_bits().hash(&mut hasher);
        bar.high().to_bits().hash(&mut hasher);
        bar.low().to_bits().hash(&mut hasher);
        bar.close().to_bits().hash(&mut hasher);
        bar.volume().to_bits().hash(&mut hasher);
    }
    hasher.finish()
}
