//! Memory snapshot (spec §4.4): the most recent observations held in
//! process memory for latency-critical reads. Grounded on
//! `FlashMemoryCache.h`/`.cpp`, re-architected per spec §9's redesign note:
//! instead of the original's `boost::atomic_shared_ptr`-guarded mutable
//! vector, the published buffer is an owned `Arc<Vec<T>>` swapped under a
//! short-held `RwLock`, so a reader that has already cloned the `Arc` keeps
//! seeing exactly the vector it observed regardless of later publishes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

/// What the snapshot needs to know about an item to keep it sorted, dedup
/// it, and bound queries by time. Implemented for every entity kind in
/// `model/` that the memory tier can hold.
pub trait SnapshotItem: Clone {
    fn snapshot_time(&self) -> DateTime<Utc>;
    fn snapshot_hash(&self) -> u64;
}

impl SnapshotItem for crate::model::DataItem {
    fn snapshot_time(&self) -> DateTime<Utc> {
        self.data_time
    }
    fn snapshot_hash(&self) -> u64 {
        self.hash_value()
    }
}

impl SnapshotItem for crate::model::FlashDataItem {
    fn snapshot_time(&self) -> DateTime<Utc> {
        self.stroke_time
    }
    fn snapshot_hash(&self) -> u64 {
        self.hash_value()
    }
}

impl SnapshotItem for crate::model::QualityCodedDatum {
    fn snapshot_time(&self) -> DateTime<Utc> {
        self.obstime
    }
    fn snapshot_hash(&self) -> u64 {
        self.hash_value()
    }
}

impl SnapshotItem for crate::model::MobileExternalDatum {
    fn snapshot_time(&self) -> DateTime<Utc> {
        self.data_time
    }
    fn snapshot_hash(&self) -> u64 {
        self.hash_value()
    }
}

pub struct MemorySnapshot<T: SnapshotItem> {
    data: RwLock<Arc<Vec<T>>>,
    /// The floor published by the last `clean()` call; `None` until `clean`
    /// has run at least once (spec §4.4: `getStartTime` "not initialised").
    start_time: RwLock<Option<DateTime<Utc>>>,
    /// Writer-only hash set tracking everything currently in `data`, so
    /// `fill` can filter duplicates and `clean` can retract hashes for
    /// evicted items. Guarded by a `Mutex` only so the whole snapshot stays
    /// `Sync`; the ingest loop is still the sole caller of `fill`/`clean`.
    seen: Mutex<HashSet<u64>>,
}

impl<T: SnapshotItem> Default for MemorySnapshot<T> {
    fn default() -> Self {
        Self {
            data: RwLock::new(Arc::new(Vec::new())),
            start_time: RwLock::new(None),
            seen: Mutex::new(HashSet::new()),
        }
    }
}

impl<T: SnapshotItem> MemorySnapshot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cheap clone of the currently-published `Arc`; later publishes do
    /// not affect the vector this handle points to.
    pub fn current(&self) -> Arc<Vec<T>> {
        self.data.read().unwrap().clone()
    }

    pub fn get_start_time(&self) -> Option<DateTime<Utc>> {
        *self.start_time.read().unwrap()
    }

    /// Append new items (filtered against the existing snapshot by hash),
    /// publishing a new vector atomically. Returns the count actually
    /// appended. Assumes `items` arrive in non-decreasing time order
    /// relative to the snapshot's current tail, as upstream pulls do
    /// (spec §4.4's ordering guarantee) — no re-sort is performed.
    pub fn fill(&self, items: &[T]) -> usize {
        let mut seen = self.seen.lock().unwrap();
        let new_items: Vec<&T> = items
            .iter()
            .filter(|item| seen.insert(item.snapshot_hash()))
            .collect();

        if new_items.is_empty() {
            return 0;
        }

        let current = self.data.read().unwrap().clone();
        let mut next = (*current).clone();
        next.extend(new_items.iter().map(|item| (*item).clone()));

        *self.data.write().unwrap() = Arc::new(next);
        new_items.len()
    }

    /// Drop everything older than `new_start`, publishing the floor first
    /// so a concurrent reader never sees an interval it can't actually
    /// serve — then the trimmed vector.
    pub fn clean(&self, new_start: DateTime<Utc>) {
        let current = self.data.read().unwrap().clone();
        let cut = current.partition_point(|item| item.snapshot_time() < new_start);

        // Publish the new floor before the trimmed data, per spec §4.4.
        *self.start_time.write().unwrap() = Some(new_start);

        if cut == 0 {
            return;
        }

        let mut seen = self.seen.lock().unwrap();
        for item in &current[..cut] {
            seen.remove(&item.snapshot_hash());
        }
        let retained: Vec<T> = current[cut..].to_vec();
        *self.data.write().unwrap() = Arc::new(retained);
    }

    /// Items with `snapshot_time()` in the inclusive range `[start, end]`,
    /// additionally passing `predicate` (typically a geometry filter
    /// supplied by the caller — the snapshot itself knows nothing about
    /// request geometry).
    pub fn query<F>(&self, start: DateTime<Utc>, end: DateTime<Utc>, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let data = self.current();
        let lo = data.partition_point(|item| item.snapshot_time() < start);
        let hi = data.partition_point(|item| item.snapshot_time() <= end);
        data[lo..hi]
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
