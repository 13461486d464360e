//! Token bucket rate limiter for exchange requests
//!
//! Coincheck throttles aggressive clients; the poller's own request volume is
//! small but order-book and trade fetches happen back to back every tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests allowed per refill interval
    pub max_requests: usize,
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, requests_per_interval: usize) -> Self {
        self.max_requests = requests_per_interval.max(1);
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

/// Shared token bucket. Clones draw from the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    max_permits: usize,
    last_refill: Arc<Mutex<Instant>>,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_requests)),
            max_permits: config.max_requests,
            last_refill: Arc::new(Mutex::new(Instant::now())),
            refill_interval: config.refill_interval,
        }
    }

    pub fn with_rate(requests_per_second: usize) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(requests_per_second))
    }

    /// Wait until a token is available and consume it.
    pub async fn acquire(&self) {
        loop {
            self.try_refill().await;
            if let Ok(permit) = self.permits.try_acquire() {
                permit.forget();
                return;
            }
            let wait = {
                let last = self.last_refill.lock().await;
                self.refill_interval.saturating_sub(last.elapsed())
            };
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    pub async fn try_acquire(&self) -> bool {
        self.try_refill().await;
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    async fn try_refill(&self) {
        let mut last_refill = self.last_refill.lock().await;
        if last_refill.elapsed() >= self.refill_interval {
            let current = self.permits.available_permits();
            let to_add = self.max_permits.saturating_sub(current);
            if to_add > 0 {
                self.permits.add_permits(to_add);
            }
            *last_refill = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_permits() {
        let limiter = RateLimiter::with_rate(5);
        assert_eq!(limiter.available_permits(), 5);
        assert_eq!(limiter.max_permits(), 5);
    }

    #[tokio::test]
    async fn test_zero_rate_is_clamped() {
        let limiter = RateLimiter::with_rate(0);
        assert_eq!(limiter.max_permits(), 1);
    }

    #[tokio::test]
    async fn test_try_acquire_exhausted() {
        let config = RateLimiterConfig::default()
            .with_rate(2)
            .with_refill_interval(Duration::from_secs(60));
        let limiter = RateLimiter::new(config);

        limiter.acquire().await;
        limiter.acquire().await;
        assert_eq!(limiter.available_permits(), 0);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let config = RateLimiterConfig::default()
            .with_rate(1)
            .with_refill_interval(Duration::from_millis(30));
        let limiter = RateLimiter::new(config);

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_clone_shares_bucket() {
        let limiter1 = RateLimiter::new(
            RateLimiterConfig::default()
                .with_rate(3)
                .with_refill_interval(Duration::from_secs(60)),
        );
        let limiter2 = limiter1.clone();

        limiter1.acquire().await;
        assert_eq!(limiter2.available_permits(), 2);
    }
}
