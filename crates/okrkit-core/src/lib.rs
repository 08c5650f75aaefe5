//! okrkit core: the request layer of the objectives dashboard.
//!
//! - `api`: authenticated HTTP client with single-flight token refresh
//! - `auth`: credential store and persistence backends
//! - `cache`: time-boxed response cache and fetch hooks
//! - `config`: client configuration
//! - `models`: API payload types

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, AuthService, Method, OkrApi, RequestOptions};
pub use auth::{CredentialStore, Navigator, TokenPair};
pub use cache::{CachedQuery, OptimisticQuery, QueryState, ResponseCache};
pub use config::Config;
