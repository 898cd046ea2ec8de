//! Login attempt bookkeeping.
//!
//! The stored value is the number of attempts a key has left. Login sets it
//! to `max_failed_attempts - 1` on the first failure, decrements it on each
//! further failure, and clears it on success. Zero means locked until the
//! entry's TTL runs out.
//!
//! Every [`SWEEP_EVERY`] writes the in-memory table drops expired entries, so
//! keys that never come back do not accumulate.
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[async_trait]
pub trait LoginThrottle: Send + Sync {
    /// Remaining attempts for `key`, or `None` when nothing is recorded.
    async fn failure_count(&self, key: &str) -> Option<u32>;
    async fn set_failure_count(&self, key: &str, remaining: u32, ttl: Duration);
    async fn reset(&self, key: &str);
}

#[derive(Debug, Clone)]
struct ThrottleEntry {
    remaining: u32,
    expires_at: Instant,
}

pub const SWEEP_EVERY: u32 = 256;

#[derive(Debug, Clone, Default)]
pub struct InMemoryThrottle {
    entries: Arc<DashMap<String, ThrottleEntry>>,
    writes: Arc<AtomicU32>,
}

impl InMemoryThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl LoginThrottle for InMemoryThrottle {
    async fn failure_count(&self, key: &str) -> Option<u32> {
        let remaining = self.entries.get(key).and_then(|entry| {
            if entry.expires_at > Instant::now() {
                Some(entry.remaining)
            } else {
                None
            }
        });
        if remaining.is_none() {
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        }
        remaining
    }

    async fn set_failure_count(&self, key: &str, remaining: u32, ttl: Duration) {
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.purge_expired();
        }
        let expires_at = Instant::now()
            .checked_add(ttl)
            .unwrap_or_else(Instant::now);
        self.entries.insert(
            key.to_string(),
            ThrottleEntry {
                remaining,
                expires_at,
            },
        );
    }

    async fn reset(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_key_has_no_record() {
        let throttle = InMemoryThrottle::new();
        assert_eq!(throttle.failure_count("10.0.0.1").await, None);
    }

    #[tokio::test]
    async fn set_then_read_until_reset() {
        let throttle = InMemoryThrottle::new();
        throttle
            .set_failure_count("10.0.0.1", 3, Duration::from_secs(60))
            .await;
        assert_eq!(throttle.failure_count("10.0.0.1").await, Some(3));
        throttle.reset("10.0.0.1").await;
        assert_eq!(throttle.failure_count("10.0.0.1").await, None);
    }

    #[tokio::test]
    async fn entries_expire_at_their_ttl() {
        let throttle = InMemoryThrottle::new();
        throttle
            .set_failure_count("10.0.0.2", 0, Duration::from_millis(0))
            .await;
        assert_eq!(throttle.failure_count("10.0.0.2").await, None);
        throttle
            .set_failure_count("10.0.0.3", 1, Duration::from_millis(0))
            .await;
        throttle.purge_expired();
        assert!(throttle.entries.is_empty());
    }

    #[tokio::test]
    async fn writes_sweep_abandoned_keys() {
        let throttle = InMemoryThrottle::new();
        for n in 0..SWEEP_EVERY - 1 {
            throttle
                .set_failure_count(&format!("10.1.0.{n}"), 2, Duration::from_millis(0))
                .await;
        }
        assert_eq!(throttle.entries.len(), (SWEEP_EVERY - 1) as usize);
        throttle
            .set_failure_count("10.1.1.1", 2, Duration::from_secs(60))
            .await;
        assert_eq!(throttle.entries.len(), 1);
        assert_eq!(throttle.failure_count("10.1.1.1").await, Some(2));
    }
}
