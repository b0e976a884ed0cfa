//! System-wide bound on in-flight capture requests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Stats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    acquired_total: AtomicUsize,
}

/// Shared gate sized to the concurrency budget. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    stats: Arc<Stats>,
    capacity: usize,
}

/// Held for the duration of one capture request; releases on drop.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<Stats>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            stats: Arc::new(Stats::default()),
            capacity,
        }
    }

    /// Wait for a permit. Returns `None` if shutdown is signalled first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<LimiterPermit> {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            p = Arc::clone(&self.semaphore).acquire_owned() => p.ok()?,
        };

        let now = self.stats.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.peak.fetch_max(now, Ordering::AcqRel);
        self.stats.acquired_total.fetch_add(1, Ordering::Relaxed);

        Some(LimiterPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.stats.in_flight.load(Ordering::Acquire)
    }

    /// Highest concurrent permit count seen since creation.
    pub fn peak(&self) -> usize {
        self.stats.peak.load(Ordering::Acquire)
    }

    pub fn acquired_total(&self) -> usize {
        self.stats.acquired_total.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permit_released_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let cancel = CancellationToken::new();
        {
            let _a = limiter.acquire(&cancel).await.unwrap();
            let _b = limiter.acquire(&cancel).await.unwrap();
            assert_eq!(limiter.in_flight(), 2);
            assert_eq!(limiter.available(), 0);
        }
        assert_eq!(limiter.in_flight(), 0);
        assert_eq!(limiter.available(), 2);
        assert_eq!(limiter.peak(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_becomes_one() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_returns_on_cancel() {
        let limiter = ConcurrencyLimiter::new(1);
        let cancel = CancellationToken::new();
        let _held = limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_exhausted_limiter_blocks_until_release() {
        use tokio_test::{assert_pending, assert_ready, task};

        let limiter = ConcurrencyLimiter::new(1);
        let cancel = CancellationToken::new();
        let held = tokio_test::block_on(limiter.acquire(&cancel)).unwrap();

        let mut waiter = task::spawn(limiter.acquire(&cancel));
        assert_pending!(waiter.poll());

        drop(held);
        assert!(waiter.is_woken());
        let permit = assert_ready!(waiter.poll());
        assert!(permit.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_never_exceeds_capacity() {
        let limiter = ConcurrencyLimiter::new(3);
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _p = limiter.acquire(&cancel).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(limiter.peak(), 3);
        assert_eq!(limiter.acquired_total(), 20);
    }
}
