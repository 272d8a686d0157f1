//! Bounded worker slot pool (spec §5): caps concurrent query-dispatch work
//! so a burst of requests can't starve the ingest loop's mirror writes.
//!
//! Grounded on `PostgreSQLConnectionPool.h/.cpp`'s bounded-slot semantics,
//! re-expressed with `tokio::sync::Semaphore` rather than a hand-rolled
//! condvar queue. Per spec §9's redesign note, the pool owns no table-level
//! synchronization of its own: the
//! mirror's per-table write mutexes (`mirror.rs`) are what actually
//! serialize writers, so this pool is strictly an admission-control gate.

use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{ObsCacheError, Result};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

/// Held for the duration of one unit of work; releases its slot on drop.
pub struct PoolSlot<'a> {
    _permit: SemaphorePermit<'a>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Waits for a free slot. Only fails if the pool has been shut down.
    pub async fn acquire(&self) -> Result<PoolSlot<'_>> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ObsCacheError::Shutdown)?;
        Ok(PoolSlot { _permit: permit })
    }

    /// Non-blocking slot attempt, for callers that want to fail fast under
    /// load instead of queuing.
    pub fn try_acquire(&self) -> Option<PoolSlot<'_>> {
        self.semaphore.try_acquire().ok().map(|permit| PoolSlot { _permit: permit })
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Prevents any further acquisitions; in-flight slots still drain
    /// normally. Used during shutdown so the ingest loop's final tick can
    /// finish without new query work being admitted.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_until_a_slot_frees() {
        let pool = WorkerPool::new(1);
        let first = pool.acquire().await.unwrap();
        assert_eq!(pool.available_slots(), 0);
        drop(first);
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.available_slots(), 0);
        drop(second);
        assert_eq!(pool.available_slots(), 1);
    }

    #[test]
    fn try_acquire_fails_when_exhausted() {
        let pool = WorkerPool::new(1);
        let _held = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
    }

    #[tokio::test]
    async fn closed_pool_refuses_new_acquisitions() {
        let pool = WorkerPool::new(2);
        pool.close();
        assert!(pool.acquire().await.is_err());
    }
}
