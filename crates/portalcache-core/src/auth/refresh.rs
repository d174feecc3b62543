//! Transparent token refresh on 401.
//!
//! [`AuthRefreshCoordinator::guarded`] sends a request and, when the server
//! answers 401, renews the credentials and replays the request once. However
//! many requests fail at the same moment, a single refresh call is made: the
//! first caller installs a shared future in the pending slot and everyone
//! else awaits that same future.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::tokens::{Credentials, TokenGrant, TokenStore};
use crate::api::envelope::Response;
use crate::api::executor::RequestExecutor;
use crate::api::request::RequestDescriptor;
use crate::api::retry::RetryPolicy;
use crate::api::ApiError;

pub const REFRESH_PATH: &str = "/auth/refresh";

type RefreshResult = Result<Credentials, Arc<ApiError>>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Clone is cheap; clones share the pending refresh slot.
#[derive(Clone)]
pub struct AuthRefreshCoordinator {
    executor: RequestExecutor,
    retry: RetryPolicy,
    pending: Arc<Mutex<Option<PendingRefresh>>>,
}

impl AuthRefreshCoordinator {
    pub fn new(executor: RequestExecutor, retry: RetryPolicy) -> Self {
        Self {
            executor,
            retry,
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        self.executor.tokens()
    }

    /// Whether a refresh is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Send `desc`, refreshing credentials and replaying once on 401.
    pub async fn guarded(&self, desc: &RequestDescriptor) -> Result<Response, ApiError> {
        let sent_token = if desc.skip_auth {
            None
        } else {
            self.tokens().access_token()
        };

        let unauthorized = match self.dispatch(desc, sent_token.as_deref()).await {
            Err(err) if err.is_unauthorized() && !desc.skip_auth_refresh => err,
            other => return other,
        };

        let current = self.tokens().access_token();
        if current.is_some() && current != sent_token {
            // Someone refreshed while this request was in flight.
            debug!(path = %desc.path, "Credentials rotated during request, replaying");
        } else if let Err(e) = self.refresh().await {
            warn!(path = %desc.path, error = %e, "Token refresh failed");
            return Err(unauthorized);
        }

        let replay = desc.clone().skip_auth_refresh();
        let token = if replay.skip_auth {
            None
        } else {
            self.tokens().access_token()
        };
        self.dispatch(&replay, token.as_deref()).await
    }

    async fn dispatch(
        &self,
        desc: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        if desc.retryable {
            self.retry
                .run(move |_| self.executor.execute_with_token(desc, token))
                .await
        } else {
            self.executor.execute_with_token(desc, token).await
        }
    }

    /// Join the in-flight refresh, or start one if none is pending.
    pub async fn refresh(&self) -> RefreshResult {
        let flight = {
            let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    debug!("Starting token refresh");
                    let executor = self.executor.clone();
                    let flight = Self::perform_refresh(executor)
                        .map(|result| result.map_err(Arc::new))
                        .boxed()
                        .shared();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.clone().await;

        let mut slot = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|pending| pending.ptr_eq(&flight)) {
            *slot = None;
        }
        result
    }

    /// POST the refresh token and store the new credentials. Any failure
    /// clears the stored credentials.
    async fn perform_refresh(executor: RequestExecutor) -> Result<Credentials, ApiError> {
        let tokens = executor.tokens().clone();

        let result = async {
            let refresh_token = tokens.refresh_token().ok_or_else(|| ApiError::Unauthorized {
                message: "No refresh token available".to_string(),
                errors: Vec::new(),
            })?;
            let desc = RequestDescriptor::post(REFRESH_PATH)
                .unauthenticated()
                .json(&RefreshRequest {
                    refresh_token: &refresh_token,
                })?;
            let grant: TokenGrant = executor.execute(&desc).await?.into_data()?;
            let mut credentials = grant.credentials().ok_or_else(|| {
                ApiError::InvalidResponse("Refresh response carried no access token".to_string())
            })?;
            // Servers that don't rotate refresh tokens omit it from the reply.
            if credentials.refresh_token.is_none() {
                credentials.refresh_token = Some(refresh_token);
            }
            Ok::<_, ApiError>(credentials)
        }
        .await;

        match result {
            Ok(credentials) => {
                tokens.set_credentials(&credentials);
                info!("Access token refreshed");
                Ok(credentials)
            }
            Err(e) => {
                tokens.clear();
                Err(e)
            }
        }
    }
}
