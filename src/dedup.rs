//! Insert-dedup LRU (spec §4.2): a single-writer set remembering the last
//! `K` inserted item hashes, so the ingest loop can skip rows it already
//! wrote to the mirror without re-running the idempotent-but-not-free
//! UPSERT. Backed by the `lru` crate (grounded on the pack's own choice for
//! this exact purpose — see DESIGN.md).

use lru::LruCache;
use std::num::NonZeroUsize;

pub struct DedupLru {
    cache: LruCache<u64, ()>,
}

impl DedupLru {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: LruCache::new(capacity),
        }
    }

    /// True if `hash` was added previously and hasn't since been evicted.
    /// Looking it up also refreshes its recency, matching `exists` doubling
    /// as a touch in the original single-writer usage pattern.
    pub fn exists(&mut self, hash: u64) -> bool {
        self.cache.get(&hash).is_some()
    }

    /// Marks `hash` as the most-recently-inserted; evicts the least-recently
    /// inserted entry once capacity is exceeded.
    pub fn add(&mut self, hash: u64) {
        self.cache.put(hash, ());
    }

    /// Change capacity, evicting the least-recently-used entries if shrinking.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        self.cache.resize(capacity);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_exists() {
        let mut lru = DedupLru::new(8);
        assert!(!lru.exists(1));
        lru.add(1);
        assert!(lru.exists(1));
    }

    #[test]
    fn eviction_drops_least_recent() {
        let mut lru = DedupLru::new(2);
        lru.add(1);
        lru.add(2);
        lru.add(3); // evicts 1
        assert!(!lru.exists(1));
        assert!(lru.exists(2));
        assert!(lru.exists(3));
    }

    #[test]
    fn resize_shrinks_capacity() {
        let mut lru = DedupLru::new(4);
        lru.add(1);
        lru.add(2);
        lru.add(3);
        lru.resize(2);
        assert!(lru.len() <= 2);
    }

    #[test]
    fn dedup_correctness_property() {
        // ingest(B) must leave every hash in B present afterward (bounded by capacity).
        let mut lru = DedupLru::new(100);
        let batch: Vec<u64> = (0..50).collect();
        for h in &batch {
            lru.add(*h);
        }
        for h in &batch {
            assert!(lru.exists(*h));
        }
    }
}
