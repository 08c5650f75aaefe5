//! REST API client module for the objectives service.
//!
//! This module provides the `ApiClient` for authenticated calls with
//! transparent token refresh, plus the `AuthService` and `OkrApi` endpoint
//! groups built on it.
//!
//! The API uses bearer token authentication. Tokens are obtained from
//! `/auth/login` and rotated through `/auth/refresh`.

pub mod auth;
pub mod client;
pub mod error;
pub mod okr;
pub mod transport;

pub use auth::AuthService;
pub use client::{ApiClient, RequestOptions, REFRESH_PATH};
pub use error::ApiError;
pub use okr::OkrApi;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
