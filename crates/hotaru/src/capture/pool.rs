//! Bounded frame-buffer pool
//!
//! Models the driver's tiny set of frame buffers (one or two on small
//! boards). A checkout blocks until a buffer is free or the wait times out;
//! each checkout must be matched by exactly one checkin.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::CaptureError;

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub outstanding: usize,
    pub checkouts: u64,
    pub checkins: u64,
}

pub struct BufferPool {
    slots: Semaphore,
    capacity: usize,
    outstanding: AtomicUsize,
    checkouts: AtomicU64,
    checkins: AtomicU64,
}

impl BufferPool {
    /// Create a pool with `capacity` buffers (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Semaphore::new(capacity),
            capacity,
            outstanding: AtomicUsize::new(0),
            checkouts: AtomicU64::new(0),
            checkins: AtomicU64::new(0),
        }
    }

    /// Take one buffer, waiting at most `timeout`.
    pub async fn checkout(&self, timeout: Duration) -> Result<(), CaptureError> {
        match tokio::time::timeout(timeout, self.slots.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                self.outstanding.fetch_add(1, Ordering::SeqCst);
                self.checkouts.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(_)) => Err(CaptureError::Closed),
            Err(_) => Err(CaptureError::Timeout(timeout)),
        }
    }

    /// Return one buffer. Returns false (and leaves the pool untouched) if
    /// nothing was checked out.
    pub fn checkin(&self) -> bool {
        let returned = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if returned {
            self.checkins.fetch_add(1, Ordering::Relaxed);
            self.slots.add_permits(1);
        } else {
            warn!("Frame buffer released without a matching checkout");
        }
        returned
    }

    /// Stop handing out buffers; pending and future checkouts fail.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            outstanding: self.outstanding.load(Ordering::SeqCst),
            checkouts: self.checkouts.load(Ordering::Relaxed),
            checkins: self.checkins.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn checkout_and_checkin_balance() {
        let pool = BufferPool::new(2);
        pool.checkout(Duration::from_millis(10)).await.unwrap();
        pool.checkout(Duration::from_millis(10)).await.unwrap();
        assert_eq!(pool.stats().outstanding, 2);

        assert!(pool.checkin());
        assert!(pool.checkin());

        let stats = pool.stats();
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.checkouts, 2);
        assert_eq!(stats.checkins, 2);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = BufferPool::new(1);
        pool.checkout(Duration::from_millis(10)).await.unwrap();

        let err = pool.checkout(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, CaptureError::Timeout(Duration::from_millis(20)));

        // Returning the buffer frees the slot again
        pool.checkin();
        pool.checkout(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn double_checkin_is_ignored() {
        let pool = BufferPool::new(1);
        pool.checkout(Duration::from_millis(10)).await.unwrap();
        assert!(pool.checkin());
        assert!(!pool.checkin());

        // Capacity must not grow past one
        pool.checkout(Duration::from_millis(10)).await.unwrap();
        assert!(pool.checkout(Duration::from_millis(10)).await.is_err());
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped_to_one() {
        let pool = BufferPool::new(0);
        assert_eq!(pool.stats().capacity, 1);
        pool.checkout(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn closed_pool_rejects_checkout() {
        let pool = BufferPool::new(1);
        pool.close();
        let err = pool.checkout(Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(err, CaptureError::Closed);
    }
}
