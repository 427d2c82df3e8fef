//! # Shared Cache Crate
//!
//! The key-value cache port every service shares. Entries are hints: always
//! recomputable from the source of truth, bounded in staleness by their TTL,
//! and safe to lose wholesale.
//!
//! ## Design Principles
//!
//! - **Port, not engine**: services depend on [`KeyValueStore`]; the
//!   in-memory adapter here can be swapped for a networked one without
//!   touching call sites.
//! - **Atomic read-modify-write**: [`KeyValueStore::compare_and_swap`] is
//!   part of the port because the admission limiter's correctness depends on
//!   it. A get-then-set sequence over two calls is not equivalent.
//! - **Soft failure**: every operation is bounded by the client's timeout,
//!   and an unavailable cache surfaces as [`CacheError::Unavailable`], which
//!   read paths treat as a miss.

pub mod client;
pub mod keys;
pub mod memory;
pub mod store;
pub mod testing;

pub use client::CacheClient;
pub use memory::MemoryStore;
pub use store::{CacheError, KeyValueStore};

/// Default entry lifetime. Cached projections go stale after five minutes
/// even if invalidation never reaches them.
pub const DEFAULT_TTL_SECS: u64 = 300;
