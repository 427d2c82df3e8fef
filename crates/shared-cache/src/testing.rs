//! Test doubles for exercising degraded-cache paths.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::store::{CacheError, KeyValueStore};

/// A store in permanent outage: every operation fails with `Unavailable`.
///
/// Used to verify that callers honor their degradation contract (reads fall
/// back to source, the limiter applies its failure policy) instead of
/// propagating the outage.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many operations were attempted against the outage.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn fail<T>(&self) -> Result<T, CacheError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(CacheError::Unavailable {
            reason: "injected outage".to_owned(),
        })
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        self.fail()
    }

    async fn set(
        &self,
        _key: &str,
        _value: Bytes,
        _ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        self.fail()
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&[u8]>,
        _value: Bytes,
        _ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        self.fail()
    }
}
