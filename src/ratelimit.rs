//! Request rate limiting.
//!
//! Handlers depend on the `RateLimiter` trait; the in-process fixed-window
//! limiter is enough for a single instance. Multi-instance deployments plug
//! a shared backend in behind the same trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset: Duration,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one hit against `key` and report whether it is within `limit`
    /// hits per `window`.
    async fn check(&self, key: &str, limit: u32, window: Duration) -> LimitResult;
}

const DEFAULT_PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    /// End of this key's own window; pruning never uses another caller's.
    expires: Instant,
    count: u32,
}

#[derive(Debug)]
struct Windows {
    entries: HashMap<String, Window>,
    /// Size at which the next prune runs. Grows with the live set so a map
    /// full of live entries is not rescanned on every call.
    prune_at: usize,
    threshold: usize,
}

/// Single-process fixed-window limiter.
pub struct MemoryRateLimiter {
    windows: Mutex<Windows>,
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }
}

impl MemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter that starts evicting expired keys once it tracks `threshold` of them.
    pub fn with_prune_threshold(threshold: usize) -> Self {
        Self {
            windows: Mutex::new(Windows {
                entries: HashMap::new(),
                prune_at: threshold,
                threshold,
            }),
        }
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn check(&self, key: &str, limit: u32, window: Duration) -> LimitResult {
        let now = Instant::now();
        let mut state = self.windows.lock().await;

        if state.entries.len() >= state.prune_at {
            state.entries.retain(|_, w| w.expires > now);
            state.prune_at = state.threshold.max(state.entries.len() * 2);
        }

        let entry = state.entries.entry(key.to_string()).or_insert(Window {
            started: now,
            expires: now + window,
            count: 0,
        });
        if now >= entry.expires {
            *entry = Window {
                started: now,
                expires: now + window,
                count: 0,
            };
        }
        entry.count = entry.count.saturating_add(1);

        let reset = entry.expires.saturating_duration_since(now);
        LimitResult {
            success: entry.count <= limit,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = MemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        for i in 0..3 {
            let r = limiter.check("k", 3, window).await;
            assert!(r.success);
            assert_eq!(r.remaining, 2 - i);
        }
        let blocked = limiter.check("k", 3, window).await;
        assert!(!blocked.success);
        assert_eq!(blocked.remaining, 0);
        assert!(blocked.reset <= window);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let limiter = MemoryRateLimiter::new();
        let window = Duration::from_secs(60);
        assert!(limiter.check("a", 1, window).await.success);
        assert!(!limiter.check("a", 1, window).await.success);
        assert!(limiter.check("b", 1, window).await.success);
    }

    #[tokio::test]
    async fn window_expiry_resets_count() {
        let limiter = MemoryRateLimiter::new();
        let window = Duration::from_millis(30);
        assert!(limiter.check("k", 1, window).await.success);
        assert!(!limiter.check("k", 1, window).await.success);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.check("k", 1, window).await.success);
    }

    #[tokio::test]
    async fn pruning_keeps_live_entries_of_longer_windows() {
        let limiter = MemoryRateLimiter::with_prune_threshold(3);
        let long = Duration::from_secs(300);
        let short = Duration::from_millis(10);

        assert!(limiter.check("sender", 1, long).await.success);
        assert!(limiter.check("burst-1", 5, short).await.success);
        assert!(limiter.check("burst-2", 5, short).await.success);
        tokio::time::sleep(Duration::from_millis(30)).await;

        // Reaching the threshold prunes with a short-window caller.
        assert!(limiter.check("burst-3", 5, short).await.success);
        {
            let state = limiter.windows.lock().await;
            assert!(state.entries.contains_key("sender"));
            assert!(!state.entries.contains_key("burst-1"));
            assert!(!state.entries.contains_key("burst-2"));
        }
        assert!(!limiter.check("sender", 1, long).await.success);
    }

    #[tokio::test]
    async fn live_map_is_not_rescanned_every_call() {
        let limiter = MemoryRateLimiter::with_prune_threshold(2);
        let window = Duration::from_secs(60);
        for key in ["a", "b", "c"] {
            limiter.check(key, 10, window).await;
        }
        let state = limiter.windows.lock().await;
        assert_eq!(state.entries.len(), 3);
        assert_eq!(state.prune_at, 4);
    }
}
