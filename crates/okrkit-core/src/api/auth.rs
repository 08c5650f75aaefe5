use serde_json::json;
use tracing::{debug, info};

use super::{ApiClient, ApiError, RequestOptions};
use crate::auth::TokenPair;
use crate::cache::ResponseCache;
use crate::models::{RegisterResponse, TokenResponse, UserResponse};

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const ME_PATH: &str = "/auth/me";
const LOGOUT_PATH: &str = "/auth/logout";

/// Session operations on top of `ApiClient`
#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
    cache: ResponseCache,
}

impl AuthService {
    pub fn new(api: ApiClient, cache: ResponseCache) -> Self {
        Self { api, cache }
    }

    /// Sign in and store the returned token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let options = RequestOptions::post(json!({ "email": email, "password": password })).skip_auth();
        let tokens: TokenResponse = self.api.send_json(LOGIN_PATH, options).await?;
        self.api
            .credentials()
            .set(TokenPair::from(tokens.clone()))
            .await;
        info!("Signed in");
        Ok(tokens)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<RegisterResponse, ApiError> {
        let options = RequestOptions::post(json!({
            "email": email,
            "password": password,
            "full_name": full_name,
        }))
        .skip_auth();
        self.api.send_json(REGISTER_PATH, options).await
    }

    pub async fn me(&self) -> Result<UserResponse, ApiError> {
        self.api.get_json(ME_PATH).await
    }

    /// Tell the server (best effort), then forget credentials and cached data
    pub async fn logout(&self) {
        if let Err(e) = self.api.request(LOGOUT_PATH, RequestOptions::post(json!({}))).await {
            debug!(error = %e, "Logout endpoint failed, clearing local session anyway");
        }
        self.api.credentials().clear().await;
        self.cache.clear();
        info!("Signed out");
    }

    pub async fn is_authenticated(&self) -> bool {
        self.api.credentials().is_authenticated().await
    }
}
