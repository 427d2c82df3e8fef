//! The cache port: what every adapter must provide.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by cache operations.
///
/// There is deliberately no "not found" variant: absence is data
/// (`Ok(None)`), not an error. `Unavailable` covers timeouts, refused
/// connections, and adapter-internal faults alike, because callers react to
/// all of them the same way.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not serve the operation in time, or at all.
    #[error("cache unavailable: {reason}")]
    Unavailable { reason: String },

    /// A stored value could not be serialized or deserialized.
    #[error("cache codec failure for key `{key}`")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// A shared key-value store with per-entry expiry.
///
/// Adapters must honor three contracts:
///
/// - `set` with a TTL makes the entry unreadable once the TTL elapses,
///   whether or not storage has physically reclaimed it.
/// - `delete` of an absent key is a no-op, not an error, so invalidation is
///   idempotent.
/// - `compare_and_swap` is atomic with respect to every other operation on
///   the same key, including other CAS calls from other processes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a live entry. Expired and absent entries are both `None`.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store an entry, replacing any previous value. `None` TTL means the
    /// entry lives until deleted.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>)
        -> Result<(), CacheError>;

    /// Remove an entry if present.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically replace the entry iff its current live value equals
    /// `expected` (`None` meaning absent or expired). Returns whether the
    /// swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError>;
}
