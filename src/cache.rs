//! In-process keyed cache with per-entry TTL.
//!
//! Writes never invalidate entries: readers may observe a payload that is
//! stale by at most the TTL. Known property of the list endpoint, not a bug.

use std::{collections::HashMap, future::Future, sync::Arc};

use parking_lot::RwLock;

use crate::error::AppResult;

pub trait Clock: Send + Sync {
    fn now_sec(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_sec(&self) -> i64 {
        now_sec()
    }
}

struct Entry {
    payload: String,
    expires_at: i64,
}

#[derive(Clone)]
pub struct ListCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), clock }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| self.clock.now_sec() < e.expires_at)
            .map(|e| e.payload.clone())
    }

    pub fn put(&self, key: &str, payload: String, ttl_seconds: i64) {
        let expires_at = self.clock.now_sec() + ttl_seconds;
        self.entries.write().insert(key.to_string(), Entry { payload, expires_at });
    }

    /// Returns the cached payload when fresh, otherwise runs `producer` and
    /// stores its output for `ttl_seconds`. Concurrent misses may each run
    /// the producer; last writer wins.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &str,
        ttl_seconds: i64,
        producer: F,
    ) -> AppResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<String>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let payload = producer().await?;
        self.put(key, payload.clone(), ttl_seconds);
        tracing::debug!(key = %key, bytes = payload.len(), "cache refreshed");
        Ok(payload)
    }
}

pub(crate) fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct ManualClock(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_sec(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_cache() -> (ListCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (ListCache::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn returns_cached_payload_within_ttl() {
        let (cache, _clock) = manual_cache();

        let first = cache.get_or_populate("movies", 60, || async { Ok("v1".to_string()) }).await;
        assert_eq!(first.unwrap(), "v1");

        // Producer output changed, but the entry is still fresh.
        let second = cache.get_or_populate("movies", 60, || async { Ok("v2".to_string()) }).await;
        assert_eq!(second.unwrap(), "v1");
    }

    #[tokio::test]
    async fn repopulates_after_expiry() {
        let (cache, clock) = manual_cache();

        cache.get_or_populate("movies", 60, || async { Ok("v1".to_string()) }).await.unwrap();

        clock.advance(59);
        assert_eq!(cache.get("movies"), Some("v1".to_string()));

        clock.advance(1);
        assert_eq!(cache.get("movies"), None);

        let refreshed =
            cache.get_or_populate("movies", 60, || async { Ok("v2".to_string()) }).await.unwrap();
        assert_eq!(refreshed, "v2");
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let (cache, _clock) = manual_cache();

        cache.put("a", "payload-a".to_string(), 60);
        assert_eq!(cache.get("a"), Some("payload-a".to_string()));
        assert_eq!(cache.get("b"), None);
    }

    #[tokio::test]
    async fn producer_error_leaves_no_entry() {
        let (cache, _clock) = manual_cache();

        let result = cache
            .get_or_populate("movies", 60, || async {
                Err(crate::error::AppError::Validation("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.get("movies"), None);
    }
}
