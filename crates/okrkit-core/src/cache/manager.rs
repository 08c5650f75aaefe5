use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use crate::api::ApiError;
use crate::config::DEFAULT_CACHE_TTL_SECS;

/// A loader future for one cache key
pub type FetchFuture = BoxFuture<'static, Result<Value, ApiError>>;

type SharedFetch = Shared<FetchFuture>;

/// The load currently registered for a key
struct InFlight {
    id: u64,
    task: SharedFetch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Value, stored_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            value,
            stored_at,
            ttl,
        }
    }

    /// Valid while `now - stored_at <= ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now - self.stored_at <= self.ttl
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }
}

/// In-memory response cache keyed by request path (path + query).
///
/// Expired entries read as misses and are evicted when encountered. Loads
/// going through `fetch_shared` are coalesced per key: while one is in
/// flight, later callers await the same result instead of starting another
/// network call.
///
/// Only the load registered for a key may store its result. `set`,
/// invalidation and `fetch_fresh` unregister the running load, so a load
/// started before them never writes its older value back. Lock order is
/// `in_flight` then `entries`. Clone is cheap and clones share state.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
    next_load: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_load: Arc::new(AtomicU64::new(0)),
            clock,
            default_ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored value for `key`, or `None` on a miss. An expired entry is
    /// removed as a side effect.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_valid_at(now) => Some(entry.value.clone()),
            Some(entry) => {
                debug!(key = key, age_secs = entry.age_at(now).num_seconds(), "Evicting expired cache entry");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stored value deserialized into `T`; a value of another shape is a miss
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key = key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    /// Store `value`, superseding any load in flight for `key`
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let mut in_flight = self.in_flight();
        in_flight.remove(key);
        self.store(key, value, ttl);
    }

    fn store(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry::new(value, self.clock.now(), ttl);
        self.entries().insert(key.to_string(), entry);
    }

    pub fn set_default(&self, key: &str, value: Value) {
        self.set(key, value, self.default_ttl);
    }

    /// True if a valid entry exists; does not evict
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries()
            .get(key)
            .map(|entry| entry.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove exactly one entry and forget its in-flight load; returns
    /// whether an entry existed
    pub fn invalidate(&self, key: &str) -> bool {
        let mut in_flight = self.in_flight();
        in_flight.remove(key);
        self.entries().remove(key).is_some()
    }

    /// Remove every entry whose key matches `pattern`.
    /// An invalid pattern is an error and removes nothing.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize, ApiError> {
        let regex = Regex::new(pattern).map_err(|e| ApiError::InvalidPattern(e.to_string()))?;
        Ok(self.invalidate_matching(&regex))
    }

    pub fn invalidate_matching(&self, regex: &Regex) -> usize {
        let mut in_flight = self.in_flight();
        in_flight.retain(|key, _| !regex.is_match(key));
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, _| !regex.is_match(key));
        let removed = before - entries.len();
        debug!(pattern = %regex, removed = removed, "Invalidated cache entries");
        removed
    }

    pub fn clear(&self) {
        let mut in_flight = self.in_flight();
        in_flight.clear();
        self.entries().clear();
    }

    /// Cached value if valid, otherwise load through `fetch_shared`
    pub async fn get_or_fetch<F>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Value, ApiError>
    where
        F: FnOnce() -> FetchFuture,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        self.fetch_shared(key, ttl, fetch).await
    }

    /// Load `key` from the network, joining a load already in flight.
    ///
    /// `fetch` is only called when no load for `key` is running; it must not
    /// touch this cache before returning its future. A successful result is
    /// stored with `ttl` unless the load was superseded meanwhile; a failure
    /// leaves any existing entry untouched.
    pub async fn fetch_shared<F>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Value, ApiError>
    where
        F: FnOnce() -> FetchFuture,
    {
        let task = {
            let mut in_flight = self.in_flight();
            match in_flight.get(key) {
                Some(existing) => {
                    debug!(key = key, "Joining in-flight request");
                    existing.task.clone()
                }
                None => self.start_load(&mut in_flight, key, ttl, fetch()),
            }
        };
        task.await
    }

    /// Load `key` from the network with a new call, even when a load is
    /// already in flight. The new load replaces the running one as the load
    /// whose result gets stored; callers already awaiting the old one still
    /// receive its result.
    pub async fn fetch_fresh<F>(&self, key: &str, ttl: Duration, fetch: F) -> Result<Value, ApiError>
    where
        F: FnOnce() -> FetchFuture,
    {
        let task = {
            let mut in_flight = self.in_flight();
            if in_flight.contains_key(key) {
                debug!(key = key, "Superseding in-flight request");
            }
            self.start_load(&mut in_flight, key, ttl, fetch())
        };
        task.await
    }

    fn start_load(
        &self,
        in_flight: &mut HashMap<String, InFlight>,
        key: &str,
        ttl: Duration,
        load: FetchFuture,
    ) -> SharedFetch {
        let id = self.next_load.fetch_add(1, Ordering::Relaxed);
        let cache = self.clone();
        let owned_key = key.to_string();
        let task = async move {
            let result = load.await;
            cache.finish_load(&owned_key, id, &result, ttl);
            result
        }
        .boxed()
        .shared();
        in_flight.insert(
            key.to_string(),
            InFlight {
                id,
                task: task.clone(),
            },
        );
        task
    }

    fn finish_load(&self, key: &str, id: u64, result: &Result<Value, ApiError>, ttl: Duration) {
        let mut in_flight = self.in_flight();
        if in_flight.get(key).map(|load| load.id) != Some(id) {
            debug!(key = key, "Discarding result of superseded load");
            return;
        }
        in_flight.remove(key);
        if let Ok(value) = result {
            self.store(key, value.clone(), ttl);
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }
}

// ============================================================================
// Tests
// ============================================================================
