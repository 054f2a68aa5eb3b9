//! Command-rate limiting.

use std::{fmt, time::Duration};

use leaky_bucket::RateLimiter;

/// Token-bucket gate bounding command issuance rate.
///
/// Capacity and refill amount both equal the per-interval limit, so
/// throughput never exceeds `limit` commands per rolling `interval` window
/// and the token count never exceeds capacity. Waiters are served in FIFO
/// order.
pub struct QueryLimiter {
    inner: RateLimiter,
}

impl QueryLimiter {
    /// Create a limiter allowing `limit` commands per `interval`.
    ///
    /// # Panics
    ///
    /// Panics when `limit` is zero.
    #[must_use]
    pub fn new(limit: usize, interval: Duration) -> Self {
        assert!(limit > 0, "query limit must be at least 1");
        let inner = RateLimiter::builder()
            .initial(limit)
            .refill(limit)
            .interval(interval)
            .max(limit)
            .build();
        Self { inner }
    }

    /// Wait for one token and debit it.
    pub async fn acquire(&self) { self.inner.acquire_one().await; }

    /// Debit one token without waiting, when one is available.
    #[must_use]
    pub fn try_acquire(&self) -> bool { self.inner.try_acquire(1) }
}

impl fmt::Debug for QueryLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryLimiter").finish_non_exhaustive()
    }
}
