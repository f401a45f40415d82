use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState, state::NotKeyed, Quota,
    RateLimiter,
};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::debug;

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// **SEC Rate Limiter**
///
/// Token bucket guarding every outgoing request to the SEC. One instance is
/// created at program start and shared (via `Arc`) by all workers, so the
/// limit holds across concurrent filings. Defaults to the SEC's published
/// fair-access guideline of 10 requests per second.
#[derive(Debug, Clone)]
pub struct SecRateLimiter {
    limiter: Arc<Governor>,
    requests_per_second: u32,
}

impl SecRateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(10u32)),
        );
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            requests_per_second,
        }
    }

    /// Rate limiter configured for SEC EDGAR (10 requests/second).
    pub fn sec_default() -> Self {
        Self::new(10)
    }

    /// Wait until a permit is available. Called before every request that
    /// actually leaves the process; cache hits bypass it.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
        debug!("rate limit permit granted");
    }

    /// Try to take a permit without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }
}
