//! In-process request cache.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use async_trait::async_trait;

use crate::error::CacheResult;
use crate::provider::{ExpirationPolicy, RequestCache};

struct Entry {
    value: Vec<u8>,
    policy: ExpirationPolicy,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn new(value: Vec<u8>, policy: ExpirationPolicy, now: DateTime<Utc>) -> Self {
        let expires_at = match policy {
            ExpirationPolicy::Absolute(at) => at,
            ExpirationPolicy::Sliding(window) => now + window,
        };
        Self {
            value,
            policy,
            expires_at,
        }
    }

    fn expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// In-process TTL map over a mutex-guarded `HashMap`.
///
/// Expired entries are discarded lazily, on the access that observes them.
#[derive(Default)]
pub struct MemoryRequestCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryRequestCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestCache for MemoryRequestCache {
    async fn put(&self, key: &str, value: Vec<u8>, policy: ExpirationPolicy) -> CacheResult<()> {
        let now = Utc::now();
        self.entries
            .lock()
            .insert(key.to_owned(), Entry::new(value, policy, now));
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if entry.expired(now) {
            entries.remove(key);
            return Ok(None);
        }
        if let ExpirationPolicy::Sliding(window) = entry.policy {
            entry.expires_at = now + window;
        }
        Ok(Some(entry.value.clone()))
    }

    async fn take(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = Utc::now();
        let entry = self.entries.lock().remove(key);
        Ok(entry.filter(|entry| !entry.expired(now)).map(|entry| entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn put_get_round_trip() {
        let cache = MemoryRequestCache::new();
        cache
            .put("k", b"v".to_vec(), ExpirationPolicy::Sliding(Duration::minutes(1)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
        // get does not consume
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn take_consumes_exactly_once() {
        let cache = MemoryRequestCache::new();
        cache
            .put(
                "code",
                b"ticket".to_vec(),
                ExpirationPolicy::Absolute(Utc::now() + Duration::minutes(5)),
            )
            .await
            .unwrap();
        assert_eq!(cache.take("code").await.unwrap(), Some(b"ticket".to_vec()));
        assert_eq!(cache.take("code").await.unwrap(), None);
        assert_eq!(cache.get("code").await.unwrap(), None);
    }

    #[tokio::test]
    async fn absolute_expiry_in_the_past_reads_as_absent() {
        let cache = MemoryRequestCache::new();
        cache
            .put(
                "k",
                b"v".to_vec(),
                ExpirationPolicy::Absolute(Utc::now() - Duration::seconds(1)),
            )
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.take("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sliding_read_restarts_window() {
        let cache = MemoryRequestCache::new();
        cache
            .put("k", b"v".to_vec(), ExpirationPolicy::Sliding(Duration::hours(1)))
            .await
            .unwrap();

        let before = cache.entries.lock().get("k").unwrap().expires_at;
        cache.get("k").await.unwrap();
        let after = cache.entries.lock().get("k").unwrap().expires_at;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let cache = MemoryRequestCache::new();
        let policy = ExpirationPolicy::Sliding(Duration::minutes(1));
        cache.put("k", b"old".to_vec(), policy).await.unwrap();
        cache.put("k", b"new".to_vec(), policy).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"new".to_vec()));
    }
}
