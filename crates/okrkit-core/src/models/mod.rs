//! Data models for the objectives API.
//!
//! - `TokenResponse`, `UserResponse`, `RegisterResponse`: auth payloads
//! - `Objective`, `KeyResult`: OKR summaries

pub mod auth;
pub mod okr;

pub use auth::{TokenResponse, UserResponse, RegisterResponse};
pub use okr::{KeyResult, Objective};
