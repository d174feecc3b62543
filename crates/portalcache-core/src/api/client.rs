//! API client used by every service module.
//!
//! All calls go through the refresh coordinator, so a 401 is handled once
//! (refresh + replay) before the caller sees it, and transient failures are
//! retried with backoff.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::envelope::{ApiResponse, Response};
use super::executor::{RequestExecutor, Router};
use super::request::{FilePart, RequestDescriptor};
use super::retry::RetryPolicy;
use super::ApiError;
use crate::auth::{AuthRefreshCoordinator, Credentials, TokenGrant, TokenStore};
use crate::config::ClientConfig;

const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSession {
    pub credentials: Credentials,
    pub user: Option<serde_json::Value>,
}

/// Clone is cheap - the reqwest client, token store and pending refresh
/// slot are all shared.
#[derive(Clone)]
pub struct ApiClient {
    auth: AuthRefreshCoordinator,
}

impl ApiClient {
    /// Create a client for the configured API using `tokens` for auth.
    pub fn new(config: &ClientConfig, tokens: Arc<TokenStore>) -> Result<Self, ApiError> {
        let router = Router::new(&config.api_base_url, &config.route_overrides)?;
        let client = RequestExecutor::build_client(&tokens, &router)?;
        let executor = RequestExecutor::new(
            client,
            router,
            tokens,
            Duration::from_millis(config.request_timeout_ms),
        );
        let retry = RetryPolicy::new(
            config.retry.max_attempts,
            Duration::from_millis(config.retry.base_delay_ms),
        );
        Ok(Self::from_coordinator(AuthRefreshCoordinator::new(executor, retry)))
    }

    pub fn from_coordinator(auth: AuthRefreshCoordinator) -> Self {
        Self { auth }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        self.auth.tokens()
    }

    pub fn coordinator(&self) -> &AuthRefreshCoordinator {
        &self.auth
    }

    /// Send a descriptor through the guarded pipeline.
    pub async fn send(&self, desc: &RequestDescriptor) -> Result<Response, ApiError> {
        self.auth.guarded(desc).await
    }

    /// Send and validate the envelope.
    pub async fn request<T: DeserializeOwned>(
        &self,
        desc: &RequestDescriptor,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.send(desc).await?.into_envelope()
    }

    /// Send and unwrap the payload; `success: false` becomes
    /// [`ApiError::Rejected`].
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        desc: &RequestDescriptor,
    ) -> Result<T, ApiError> {
        self.request(desc).await?.into_result()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, ApiError> {
        let desc = query
            .iter()
            .fold(RequestDescriptor::get(path), |d, (k, v)| d.query(*k, v));
        self.request(&desc).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(&RequestDescriptor::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(&RequestDescriptor::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(&RequestDescriptor::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiResponse<T>, ApiError> {
        self.request(&RequestDescriptor::delete(path)).await
    }

    /// Multipart POST: `file` under the `file` field, `fields` as text parts.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        file: FilePart,
        fields: &[(&str, &str)],
    ) -> Result<ApiResponse<T>, ApiError> {
        debug!(path = path, file_name = %file.file_name, size = file.bytes.len(), "Uploading file");
        let desc = fields.iter().fold(
            RequestDescriptor::post(path).file_part("file", file),
            |d, (k, v)| d.text_part(*k, *v),
        );
        self.request(&desc).await
    }

    /// Authenticate and store the returned credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSession, ApiError> {
        debug!(email = email, "Logging in");
        let desc = RequestDescriptor::post(LOGIN_PATH)
            .unauthenticated()
            .json(&LoginRequest { email, password })?;
        let grant: TokenGrant = self.fetch(&desc).await?;

        let credentials = grant.credentials().ok_or_else(|| {
            ApiError::InvalidResponse("Login response carried no access token".to_string())
        })?;

        let tokens = self.tokens();
        tokens.set_credentials(&credentials);
        if let Some(ref user) = grant.user {
            tokens.set_user_data(user);
        }
        if let Some(ref session_id) = grant.session_id {
            tokens.set_session_id(session_id);
        }
        info!("Login succeeded");

        Ok(LoginSession {
            credentials,
            user: grant.user,
        })
    }

    /// Tell the server (best effort) and always drop local credentials.
    pub async fn logout(&self) {
        let desc = RequestDescriptor::post(LOGOUT_PATH)
            .skip_auth_refresh()
            .no_retry();
        if let Err(e) = self.send(&desc).await {
            warn!(error = %e, "Server logout failed, clearing local session anyway");
        }
        self.tokens().clear();
        info!("Logged out");
    }

    /// True when a non-expired access token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.tokens().is_valid()
    }
}
