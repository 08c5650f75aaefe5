//! Cache-backed fetch hooks for UI consumers.
//!
//! A `CachedQuery` binds a cache key to a loader and tracks the
//! loading/error/data triple a view renders from. `OptimisticQuery` adds a
//! PATCH mutation that shows its merged result before the server answers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use futures::future::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use super::manager::{FetchFuture, ResponseCache};
use crate::api::{ApiClient, ApiError, RequestOptions};

/// Loads the value for a key
pub type Loader = Arc<dyn Fn(String) -> FetchFuture + Send + Sync>;

/// Combines the current value with a mutation payload
pub type MergeFn = Arc<dyn Fn(Option<&Value>, &Value) -> Value + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryState {
    pub data: Option<Value>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct CachedQuery {
    key: Option<String>,
    ttl: Duration,
    cache: ResponseCache,
    loader: Loader,
    state: Mutex<QueryState>,
    /// Bumped by every fetch and local write; only the latest updates state
    generation: AtomicU64,
}

impl CachedQuery {
    /// A `None` key disables the query entirely
    pub fn new<F>(key: Option<String>, cache: ResponseCache, ttl: Duration, loader: F) -> Self
    where
        F: Fn(String) -> FetchFuture + Send + Sync + 'static,
    {
        Self {
            key,
            ttl,
            cache,
            loader: Arc::new(loader),
            state: Mutex::new(QueryState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Query whose loader is an authenticated GET of the key path
    pub fn for_api(api: ApiClient, key: Option<String>, cache: ResponseCache, ttl: Duration) -> Self {
        Self::new(key, cache, ttl, move |path| {
            let api = api.clone();
            async move { api.request(&path, RequestOptions::get()).await }.boxed()
        })
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn state(&self) -> QueryState {
        self.state_mut().clone()
    }

    fn state_mut(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the data, superseding any fetch still running
    pub(crate) fn set_data(&self, data: Option<Value>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state_mut();
        state.data = data;
        state.loading = false;
    }

    /// Serve from the cache, or load on a miss.
    /// A disabled query does nothing and returns `Ok(None)`.
    pub async fn load(&self) -> Result<Option<Value>, ApiError> {
        let Some(key) = self.key.clone() else {
            *self.state_mut() = QueryState::default();
            return Ok(None);
        };

        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, "Cache hit");
            let mut state = self.state_mut();
            state.data = Some(hit.clone());
            state.error = None;
            return Ok(Some(hit));
        }

        self.fetch(key, false).await.map(Some)
    }

    /// Load from the network regardless of the cache, with a new call even
    /// when a load for the key is already running
    pub async fn refetch(&self) -> Result<Option<Value>, ApiError> {
        match self.key.clone() {
            Some(key) => self.fetch(key, true).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop the cached entry without fetching
    pub fn invalidate(&self) {
        if let Some(ref key) = self.key {
            self.cache.invalidate(key);
        }
    }

    /// Bind to another key and load it
    pub async fn set_key(&mut self, key: Option<String>) -> Result<Option<Value>, ApiError> {
        if self.key != key {
            self.key = key;
            *self.state_mut() = QueryState::default();
        }
        self.load().await
    }

    async fn fetch(&self, key: String, fresh: bool) -> Result<Value, ApiError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state_mut();
            state.loading = true;
            state.error = None;
        }

        let loader = Arc::clone(&self.loader);
        let load_key = key.clone();
        let load = move || loader(load_key);
        let result = if fresh {
            self.cache.fetch_fresh(&key, self.ttl, load).await
        } else {
            self.cache.fetch_shared(&key, self.ttl, load).await
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(key = %key, "Query result superseded");
            return result;
        }
        let mut state = self.state_mut();
        state.loading = false;
        match result {
            Ok(ref value) => state.data = Some(value.clone()),
            Err(ref e) => {
                debug!(key = %key, error = %e, "Query failed");
                state.error = Some(e.to_string());
            }
        }
        result
    }
}

/// Cached query with an optimistic PATCH mutation
pub struct OptimisticQuery {
    query: CachedQuery,
    api: ApiClient,
    key: String,
    merge: MergeFn,
}

impl OptimisticQuery {
    pub fn new<M>(api: ApiClient, key: impl Into<String>, cache: ResponseCache, merge: M) -> Self
    where
        M: Fn(Option<&Value>, &Value) -> Value + Send + Sync + 'static,
    {
        let key = key.into();
        let ttl = cache.default_ttl();
        let query = CachedQuery::for_api(api.clone(), Some(key.clone()), cache, ttl);
        Self {
            query,
            api,
            key,
            merge: Arc::new(merge),
        }
    }

    pub fn query(&self) -> &CachedQuery {
        &self.query
    }

    pub fn state(&self) -> QueryState {
        self.query.state()
    }

    pub async fn load(&self) -> Result<Option<Value>, ApiError> {
        self.query.load().await
    }

    pub async fn refetch(&self) -> Result<Option<Value>, ApiError> {
        self.query.refetch().await
    }

    pub fn invalidate(&self) {
        self.query.invalidate()
    }

    /// Apply `patch` locally, then PATCH it to the server.
    ///
    /// The merged value is visible in the cache and the query state while the
    /// request is outstanding. If the server rejects it, the merged value is
    /// dropped, the query refetches, and the server's error is returned.
    pub async fn mutate(&self, patch: Value) -> Result<Value, ApiError> {
        let cache = self.query.cache();
        let previous = cache.get(&self.key).or_else(|| self.query.state().data);
        let optimistic = (self.merge)(previous.as_ref(), &patch);

        cache.set(&self.key, optimistic.clone(), self.query.ttl());
        self.query.set_data(Some(optimistic));

        match self.api.request(&self.key, RequestOptions::patch(patch)).await {
            Ok(confirmed) => Ok(confirmed),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Optimistic update rejected, reverting");
                cache.invalidate(&self.key);
                self.query.set_data(previous);
                if let Err(refetch_err) = self.query.refetch().await {
                    debug!(key = %self.key, error = %refetch_err, "Refetch after rejected update failed");
                }
                Err(e)
            }
        }
    }
}
