//! Read-through caching for owning services.
//!
//! Every service that owns cached data reads it the same way: try the
//! cache, fall back to the source of truth, repopulate best effort. The
//! source load must be side-effect free since a cache outage repeats it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_cache::{CacheClient, CacheError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Fetch `key` through the cache, computing it from `load` on a miss.
///
/// A cache outage counts as a miss: the caller still gets its value, just
/// without the shortcut. Population failures are logged and swallowed so
/// the read path never fails because the cache did. Errors from `load`
/// itself propagate untouched.
pub async fn read_through<T, E, F, Fut>(
    cache: &CacheClient,
    key: &str,
    ttl: Option<Duration>,
    load: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match cache.get_json::<T>(key).await {
        Ok(Some(hit)) => {
            debug!(key, "cache hit");
            return Ok(hit);
        }
        Ok(None) => debug!(key, "cache miss"),
        Err(error) => match error {
            CacheError::Unavailable { .. } => {
                warn!(key, %error, "cache unreachable, reading from source")
            }
            CacheError::Codec { .. } => warn!(key, %error, "cache entry unusable"),
        },
    }

    let value = load().await?;
    if let Err(error) = cache.set_json(key, &value, ttl).await {
        warn!(key, %error, "cache populate failed");
    }
    Ok(value)
}
