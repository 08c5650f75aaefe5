use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use keyring::Entry;

/// Persistence backend for the credential pair.
///
/// Values are addressed by the fixed keys in `super::credentials`.
pub trait TokenStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn store(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Session-only storage; nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| anyhow!("Token storage lock poisoned"))
    }
}

impl TokenStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Storage in the OS keychain
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl TokenStorage for KeyringStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load("access_token").unwrap(), None);

        storage.store("access_token", "abc").unwrap();
        assert_eq!(storage.load("access_token").unwrap().as_deref(), Some("abc"));

        storage.remove("access_token").unwrap();
        assert_eq!(storage.load("access_token").unwrap(), None);
    }

    #[test]
    fn test_memory_storage_remove_missing_is_ok() {
        let storage = MemoryStorage::new();
        assert!(storage.remove("refresh_token").is_ok());
    }
}
