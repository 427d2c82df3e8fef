//! Distributed fixed-window admission control.
//!
//! Window state lives in the shared cache, so every gateway instance
//! enforces one budget per client. The counter is the only piece of cache
//! state that needs true mutual exclusion, and it gets it from the store's
//! compare-and-swap: read, decide, swap against what was read, retry on
//! interference. A get-then-set sequence over two calls would admit bursts
//! past the limit whenever two instances interleave.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use shared_cache::{keys, CacheClient, CacheError};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// Per-route admission budget.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    /// Window length.
    pub window: Duration,
    /// Requests admitted per client per window.
    pub max: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(900_000),
            max: 100,
        }
    }
}

/// What to do when the cache cannot answer.
///
/// Fail-open keeps the platform available at the cost of unenforced limits
/// for the outage window; fail-closed keeps the limit enforced at the cost
/// of rejecting legitimate traffic. The choice is configuration, never an
/// implicit side effect of error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

/// Admission decision. `Reject` is a control signal for the entry point,
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject {
        /// Time until the client's window resets.
        retry_after: Duration,
    },
}

impl Decision {
    #[must_use]
    pub fn is_admit(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Wall-clock source, injectable so window arithmetic is testable.
///
/// Epoch milliseconds rather than a monotonic instant: the window state is
/// shared across instances, and only wall time means the same thing on all
/// of them. Bounded over/under admission at window edges under clock skew
/// is accepted.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// System clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}

/// One client's counter within its current window, stored as JSON under
/// `rate-limit:<client>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowState {
    count: u32,
    window_start_ms: u64,
}

#[derive(Debug, Error)]
enum LimiterError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("compare-and-swap contention exceeded {MAX_CAS_ATTEMPTS} attempts")]
    Contention,
}

/// Bound on CAS retries before the attempt counts as a cache failure.
const MAX_CAS_ATTEMPTS: u32 = 8;

/// Fixed-window rate limiter backed by the shared cache.
pub struct FixedWindowLimiter {
    cache: CacheClient,
    policy: RateLimitPolicy,
    failure_policy: FailurePolicy,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(cache: CacheClient, policy: RateLimitPolicy) -> Self {
        Self {
            cache,
            policy,
            failure_policy: FailurePolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Decide admission for one request from `client`.
    ///
    /// Never fails: a cache outage is resolved by the configured
    /// [`FailurePolicy`] instead of surfacing to the request path.
    pub async fn allow(&self, client: &str) -> Decision {
        match self.try_allow(client).await {
            Ok(decision) => decision,
            Err(error) => {
                warn!(
                    client,
                    %error,
                    policy = ?self.failure_policy,
                    "rate limit state unavailable"
                );
                match self.failure_policy {
                    FailurePolicy::FailOpen => Decision::Admit,
                    FailurePolicy::FailClosed => Decision::Reject {
                        retry_after: self.policy.window,
                    },
                }
            }
        }
    }

    async fn try_allow(&self, client: &str) -> Result<Decision, LimiterError> {
        let key = keys::rate_limit(client);
        let window_ms = self.policy.window.as_millis() as u64;

        for _ in 0..MAX_CAS_ATTEMPTS {
            let observed = self.cache.get(&key).await?;
            let now_ms = self.clock.now_ms();
            let state = observed
                .as_deref()
                .and_then(|bytes| serde_json::from_slice::<WindowState>(bytes).ok());

            let next = match state {
                // No window yet, or bytes some other writer corrupted:
                // start fresh and count this request.
                None => WindowState {
                    count: 1,
                    window_start_ms: now_ms,
                },
                // A window covers [start, start + window); at the boundary
                // the counter rolls over.
                Some(state) if now_ms.saturating_sub(state.window_start_ms) >= window_ms => {
                    WindowState {
                        count: 1,
                        window_start_ms: now_ms,
                    }
                }
                Some(state) if state.count < self.policy.max => WindowState {
                    count: state.count + 1,
                    ..state
                },
                Some(state) => {
                    let elapsed = now_ms.saturating_sub(state.window_start_ms);
                    let retry_after = Duration::from_millis(window_ms.saturating_sub(elapsed));
                    debug!(client, count = state.count, "admission rejected");
                    return Ok(Decision::Reject { retry_after });
                }
            };

            let encoded = serde_json::to_vec(&next).map_err(|source| CacheError::Codec {
                key: key.clone(),
                source,
            })?;
            // The entry outlives its window by at most the window length;
            // expiry is hygiene, the stored start decides admission.
            let installed = self
                .cache
                .compare_and_swap(
                    &key,
                    observed.as_deref(),
                    Bytes::from(encoded),
                    Some(self.policy.window),
                )
                .await?;
            if installed {
                debug!(client, count = next.count, "admission granted");
                return Ok(Decision::Admit);
            }
            // Another instance moved the counter between our read and swap.
            // Re-read and decide against the newer state.
        }

        Err(LimiterError::Contention)
    }
}
