//! Request cache trait.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::CacheResult;

/// How a cached entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationPolicy {
    /// The entry disappears at the given instant regardless of access.
    Absolute(DateTime<Utc>),
    /// Each successful read restarts the window.
    Sliding(Duration),
}

/// Short-lived keyed byte store.
///
/// Implementations must be safe for concurrent `put`/`get`/`take`. All
/// operations are point queries; nothing iterates or spans entries.
#[async_trait]
pub trait RequestCache: Send + Sync {
    /// Stores a value under the given expiration policy, replacing any
    /// existing entry.
    async fn put(&self, key: &str, value: Vec<u8>, policy: ExpirationPolicy) -> CacheResult<()>;

    /// Reads a value. Expired entries read as absent; reading a sliding
    /// entry restarts its window.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Atomically removes and returns a value.
    ///
    /// This is the single-use primitive: lookup and removal happen as one
    /// operation, so two concurrent consumers of the same key cannot both
    /// observe the entry.
    async fn take(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;
}
