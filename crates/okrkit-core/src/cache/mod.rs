//! Time-boxed response caching.
//!
//! This module provides the `ResponseCache` for short-circuiting repeated
//! reads, and the `CachedQuery`/`OptimisticQuery` hooks that UI code drives.
//! Entries are kept in memory only and expire after their ttl (five minutes
//! by default).
//!
//! A process-wide instance is available through `global()`. Call `init()`
//! once at startup to install a configured cache, and `reset()` to empty it
//! between test cases.

pub mod clock;
pub mod manager;
pub mod query;

use std::sync::OnceLock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{CacheEntry, FetchFuture, ResponseCache};
pub use query::{CachedQuery, Loader, MergeFn, OptimisticQuery, QueryState};

/// Global cache, created on first use
static GLOBAL: OnceLock<ResponseCache> = OnceLock::new();

/// Install `cache` as the process-wide instance.
/// Returns false if a global cache already exists.
pub fn init(cache: ResponseCache) -> bool {
    GLOBAL.set(cache).is_ok()
}

pub fn global() -> &'static ResponseCache {
    GLOBAL.get_or_init(ResponseCache::new)
}

/// Empty the process-wide cache
pub fn reset() {
    global().clear();
}
