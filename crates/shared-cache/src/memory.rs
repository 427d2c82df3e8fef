//! In-memory cache adapter.
//!
//! Backed by a sharded concurrent map. Expiry is enforced lazily on every
//! read and eagerly by an optional sweeper task, so an entry past its TTL is
//! never observable even if the sweeper has not run yet.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::store::{CacheError, KeyValueStore};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(value: Bytes, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| now + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// Process-local [`KeyValueStore`] adapter.
///
/// Key-level atomicity (including `compare_and_swap`) comes from the map's
/// per-shard locking: an entry handle holds the shard lock for the duration
/// of the read-compare-write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resident entries, including expired ones the sweeper has
    /// not reclaimed yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start a background task that periodically drops expired entries.
    ///
    /// Lazy expiry already guarantees correctness; the sweeper only bounds
    /// memory held by entries nobody reads again. Abort the returned handle
    /// on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.sweep();
            }
        })
    }

    fn sweep(&self) {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let swept = before.saturating_sub(self.entries.len());
        if swept > 0 {
            debug!(swept, "removed expired cache entries");
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Read guard is released above; reclaim the expired entry if it is
        // still the one we saw.
        self.entries
            .remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        self.entries
            .insert(key.to_owned(), StoredEntry::new(value, ttl, now));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        match self.entries.entry(key.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                let live = occupied.get().is_live(now);
                let current = live.then(|| occupied.get().value.as_ref());
                if current == expected {
                    occupied.insert(StoredEntry::new(value, ttl, now));
                    Ok(true)
                } else {
                    if !live {
                        occupied.remove();
                    }
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(StoredEntry::new(value, ttl, now));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}
