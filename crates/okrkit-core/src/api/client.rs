//! Authenticated client for the objectives REST API.
//!
//! Every call attaches the stored access token. A 401 triggers one token
//! refresh followed by one retry; when no refresh is possible the session is
//! cleared and the navigator is asked to show the login page.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
use super::ApiError;
use crate::auth::{CredentialStore, Navigator, NoopNavigator, TokenPair};
use crate::config::Config;
use crate::models::TokenResponse;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint exchanging a refresh token for a new token pair
pub const REFRESH_PATH: &str = "/auth/refresh";

const STATUS_NO_CONTENT: u16 = 204;
const STATUS_UNAUTHORIZED: u16 = 401;

/// Per-call options for `ApiClient::request`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    /// Explicit access token. When set, the stored token is not used and a
    /// 401 is reported as-is without refreshing.
    pub token: Option<String>,
    /// Send without any credential (login, registration)
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    pub fn post(body: Value) -> Self {
        Self::new(Method::Post).body(body)
    }

    pub fn patch(body: Value) -> Self {
        Self::new(Method::Patch).body(body)
    }

    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

/// Clone is cheap; clones share the transport, the credential store and the
/// refresh lock.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    credentials: CredentialStore,
    navigator: Arc<dyn Navigator>,
    base_url: String,
    locale: String,
    refresh_lock: Arc<Mutex<()>>,
    /// Sessions ended by a failed refresh; only changed under `refresh_lock`
    sign_outs: Arc<AtomicU64>,
}

impl ApiClient {
    /// Create a client on the reqwest transport using `config`
    pub fn new(config: &Config, credentials: CredentialStore) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::with_transport(Arc::new(transport), credentials, &config.api_base)
            .with_locale(&config.locale))
    }

    pub fn with_transport(
        transport: Arc<dyn Transport>,
        credentials: CredentialStore,
        base_url: &str,
    ) -> Self {
        Self {
            transport,
            credentials,
            navigator: Arc::new(NoopNavigator),
            base_url: base_url.trim_end_matches('/').to_string(),
            locale: crate::config::DEFAULT_LOCALE.to_string(),
            refresh_lock: Arc::new(Mutex::new(())),
            sign_outs: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    /// Locale sent as `Accept-Language`
    pub fn with_locale(mut self, locale: &str) -> Self {
        self.locale = locale.to_string();
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Perform one logical call.
    ///
    /// Returns the parsed JSON body, or `Value::Null` for 204 and empty
    /// bodies.
    pub async fn request(&self, path: &str, options: RequestOptions) -> Result<Value, ApiError> {
        if options.skip_auth {
            let response = self.send(path, &options, None).await?;
            return Self::parse_response(response);
        }

        let explicit_token = options.token.is_some();
        let sign_outs = self.sign_outs.load(Ordering::SeqCst);
        let access = match options.token {
            Some(ref token) => Some(token.clone()),
            None => self.credentials.access_token().await,
        };

        let response = self.send(path, &options, access.as_deref()).await?;
        if response.status != STATUS_UNAUTHORIZED || explicit_token {
            return Self::parse_response(response);
        }

        debug!(path = path, "Unauthorized, attempting token refresh");
        let fresh = self.refresh_after(access.as_deref(), sign_outs).await?;

        let retry = self.send(path, &options, Some(&fresh)).await?;
        Self::parse_response(retry)
    }

    /// Authenticated GET deserialized into `T`
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(path, RequestOptions::get()).await
    }

    /// Any call deserialized into `T`. Use `()` for endpoints answering 204.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let value = self.request(path, options).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    /// Obtain a usable access token after `stale` was rejected.
    ///
    /// Refreshes run one at a time. A caller that gets the lock after another
    /// caller already rotated the tokens takes the rotated token instead of
    /// spending the refresh token a second time. When the refresh fails, the
    /// first caller ends the session; callers that started before that
    /// failure only get `AuthenticationExpired`.
    async fn refresh_after(&self, stale: Option<&str>, sign_outs: u64) -> Result<String, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if self.sign_outs.load(Ordering::SeqCst) != sign_outs {
            debug!("Session already ended by a concurrent request");
            return Err(ApiError::AuthenticationExpired);
        }

        let current = self.credentials.tokens().await;
        if let Some(ref access) = current.access {
            if Some(access.as_str()) != stale {
                debug!("Token already refreshed by a concurrent request");
                return Ok(access.clone());
            }
        }

        let refreshed = match current.refresh {
            Some(ref refresh_token) => self.refresh_access_token(refresh_token).await,
            None => Err(ApiError::AuthenticationExpired),
        };
        match refreshed {
            Ok(access) => Ok(access),
            Err(e) => {
                warn!(error = %e, "Token refresh unavailable, signing out");
                self.sign_outs.fetch_add(1, Ordering::SeqCst);
                Err(self.fail_authentication().await)
            }
        }
    }

    /// Exchange the refresh token for a new pair and store it
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        let options = RequestOptions::post(json!({ "refresh_token": refresh_token }));

        let result = async {
            let response = self.send(REFRESH_PATH, &options, None).await?;
            if !response.is_success() {
                return Err(ApiError::RefreshFailed(ApiError::extract_message(
                    response.status,
                    &response.body,
                )));
            }
            serde_json::from_str::<TokenResponse>(&response.body)
                .map_err(|e| ApiError::RefreshFailed(format!("Malformed token response: {}", e)))
        }
        .await;

        let pair = TokenPair::from(result?);
        let access = pair.access_token.clone();
        self.credentials.set(pair).await;
        info!("Access token refreshed");
        Ok(access)
    }

    async fn fail_authentication(&self) -> ApiError {
        self.credentials.clear().await;
        self.navigator.redirect_to_login();
        ApiError::AuthenticationExpired
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept-Language".to_string(), self.locale.clone()),
        ];
        if let Some(token) = token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let request = HttpRequest {
            method: options.method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body: options.body.clone(),
        };

        debug!(method = %options.method, path = path, authenticated = token.is_some(), "Sending request");
        let response = self.transport.send(request).await?;
        debug!(method = %options.method, path = path, status = response.status, "Response received");
        Ok(response)
    }

    fn parse_response(response: HttpResponse) -> Result<Value, ApiError> {
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.body));
        }
        if response.status == STATUS_NO_CONTENT || response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }
}
