use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// RAII permit. Dropping it (on success, failure, or task cancellation)
/// releases the slot back to its bucket — this is how the "paired release
/// on every exit path" invariant holds without manual bookkeeping.
pub struct RateLimitGuard {
    _permit: OwnedSemaphorePermit,
}

/// A snapshot of one bucket's utilization, as surfaced by
/// `MultiRateLimiter::get_all_stats`.
#[derive(Debug, Clone, Serialize)]
pub struct BucketStats {
    pub capacity: usize,
    pub in_use: usize,
    pub total_requests: u64,
}

struct RateLimiterBucket {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    total_requests: AtomicU64,
}

impl RateLimiterBucket {
    fn new(capacity: usize) -> Self {
        RateLimiterBucket {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            total_requests: AtomicU64::new(0),
        }
    }

    async fn acquire(&self) -> RateLimitGuard {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore is never closed");
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        RateLimitGuard { _permit: permit }
    }

    fn stats(&self) -> BucketStats {
        BucketStats {
            capacity: self.capacity,
            in_use: self.capacity - self.semaphore.available_permits(),
            total_requests: self.total_requests.load(Ordering::Relaxed),
        }
    }
}

/// The two-bucket limiter named in spec: one bucket bounds concurrent LLM
/// calls, the other bounds concurrent DB queries, so a burst against one
/// resource can't starve the other.
pub struct MultiRateLimiter {
    queries: RateLimiterBucket,
    llm: RateLimiterBucket,
}

impl MultiRateLimiter {
    pub fn new(query_limit: usize, llm_limit: usize) -> Self {
        MultiRateLimiter {
            queries: RateLimiterBucket::new(query_limit),
            llm: RateLimiterBucket::new(llm_limit),
        }
    }

    pub async fn acquire_query(&self) -> RateLimitGuard {
        self.queries.acquire().await
    }

    pub async fn acquire_llm(&self) -> RateLimitGuard {
        self.llm.acquire().await
    }

    pub fn get_all_stats(&self) -> HashMap<String, BucketStats> {
        let mut stats = HashMap::new();
        stats.insert("queries".to_string(), self.queries.stats());
        stats.insert("llm".to_string(), self.llm.stats());
        stats
    }
}
