//! Timeout-guarded cache client.
//!
//! Every service talks to the cache through this wrapper rather than the raw
//! store, so no cache call can stall a request path longer than the
//! configured operation timeout. A timeout is indistinguishable from an
//! outage to the caller and is reported the same way.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::store::{CacheError, KeyValueStore};

/// Shared handle to the cache with a per-operation deadline.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KeyValueStore>,
    op_timeout: Duration,
}

impl CacheClient {
    /// Default per-operation deadline.
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(250);

    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    #[must_use]
    pub fn with_default_timeout(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(store, Self::DEFAULT_OP_TIMEOUT)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::unavailable(format!(
                "{op} exceeded {:?}",
                self.op_timeout
            ))),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.bounded("get", self.store.get(key)).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.bounded("set", self.store.set(key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.bounded("delete", self.store.delete(key)).await
    }

    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.bounded(
            "compare_and_swap",
            self.store.compare_and_swap(key, expected, value, ttl),
        )
        .await
    }

    /// Fetch and deserialize a JSON entry.
    ///
    /// An entry that fails to deserialize is evicted and reported as a miss:
    /// cached values are hints, and a corrupt hint must not poison the read
    /// path that would otherwise recompute it.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CacheError> {
        let Some(bytes) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                warn!(key, %error, "evicting undecodable cache entry");
                let _ = self.delete(key).await;
                Ok(None)
            }
        }
    }

    /// Serialize and store a JSON entry.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|source| CacheError::Codec {
            key: key.to_owned(),
            source,
        })?;
        self.set(key, Bytes::from(bytes), ttl).await
    }
}
