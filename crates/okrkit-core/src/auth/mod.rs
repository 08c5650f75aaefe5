//! Credential management.
//!
//! This module provides:
//! - `CredentialStore`: the access/refresh token pair, updated atomically
//! - `TokenStorage`: persistence backends (in-memory, OS keychain)
//! - `Navigator`: the redirect-to-login hook invoked when a session is lost

pub mod credentials;
pub mod navigator;
pub mod storage;

pub use credentials::{CredentialStore, StoredTokens, TokenPair, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
pub use navigator::{Navigator, NoopNavigator};
pub use storage::{KeyringStorage, MemoryStorage, TokenStorage};
