use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::storage::{MemoryStorage, TokenStorage};
use crate::models::TokenResponse;

/// Storage key for the access credential
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key for the refresh credential
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenResponse> for TokenPair {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        }
    }
}

/// Snapshot of what the store currently holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredTokens {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

/// Holds the access and refresh credentials.
///
/// Both values sit behind one lock, so a reader never observes a pair that
/// is half old and half new. Every change is written through to the
/// configured `TokenStorage`; storage failures are logged, not returned.
/// Clone is cheap and clones share state.
#[derive(Clone)]
pub struct CredentialStore {
    tokens: Arc<RwLock<StoredTokens>>,
    storage: Arc<dyn TokenStorage>,
}

impl CredentialStore {
    /// Create an empty store that persists to `storage`
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(StoredTokens::default())),
            storage,
        }
    }

    /// Create a store that keeps credentials for this process only
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Create a store seeded from whatever `storage` already holds
    pub fn restore(storage: Arc<dyn TokenStorage>) -> Self {
        let load = |key: &str| match storage.load(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to load persisted token");
                None
            }
        };
        let tokens = StoredTokens {
            access: load(ACCESS_TOKEN_KEY),
            refresh: load(REFRESH_TOKEN_KEY),
        };
        debug!(
            has_access = tokens.access.is_some(),
            has_refresh = tokens.refresh.is_some(),
            "Credentials restored"
        );

        Self {
            tokens: Arc::new(RwLock::new(tokens)),
            storage,
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.tokens.read().await.access.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens.read().await.refresh.clone()
    }

    pub async fn tokens(&self) -> StoredTokens {
        self.tokens.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.tokens.read().await.access.is_some()
    }

    /// Replace both credentials in a single update
    pub async fn set(&self, pair: TokenPair) {
        let mut tokens = self.tokens.write().await;
        self.persist(vec![
            (ACCESS_TOKEN_KEY, Some(pair.access_token.clone())),
            (REFRESH_TOKEN_KEY, Some(pair.refresh_token.clone())),
        ])
        .await;
        *tokens = StoredTokens {
            access: Some(pair.access_token),
            refresh: Some(pair.refresh_token),
        };
    }

    /// Drop both credentials together
    pub async fn clear(&self) {
        let mut tokens = self.tokens.write().await;
        self.persist(vec![(ACCESS_TOKEN_KEY, None), (REFRESH_TOKEN_KEY, None)])
            .await;
        *tokens = StoredTokens::default();
    }

    /// Write through to storage on the blocking pool; keychain backends do
    /// synchronous IPC. Runs under the write lock so writes land in order.
    async fn persist(&self, updates: Vec<(&'static str, Option<String>)>) {
        let storage = Arc::clone(&self.storage);
        let task = tokio::task::spawn_blocking(move || {
            for (key, value) in updates {
                let result = match value {
                    Some(ref v) => storage.store(key, v),
                    None => storage.remove(key),
                };
                if let Err(e) = result {
                    warn!(key = key, error = %e, "Failed to persist token");
                }
            }
        });
        if let Err(e) = task.await {
            warn!(error = %e, "Token persistence task failed");
        }
    }
}
