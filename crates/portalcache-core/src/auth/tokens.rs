use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::cookies::CookieJar;
use super::storage::KeyValueStore;

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRES_AT_KEY: &str = "auth_expires_at";
pub const USER_DATA_KEY: &str = "user_data";
pub const SESSION_ID_KEY: &str = "session_id";

/// Every key `clear()` purges.
const ALL_KEYS: [&str; 5] = [
    AUTH_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    EXPIRES_AT_KEY,
    USER_DATA_KEY,
    SESSION_ID_KEY,
];

/// Access token cookie lifetime.
const ACCESS_COOKIE_DAYS: i64 = 7;

/// Refresh token cookie lifetime; outlives the access token so a cleared
/// primary store can still be recovered.
const REFRESH_COOKIE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|e| Utc::now() >= e).unwrap_or(false)
    }
}

/// Token fields returned by the login and refresh endpoints. The backend is
/// inconsistent about casing, so both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(alias = "accessToken", alias = "access_token")]
    pub token: Option<String>,
    #[serde(rename = "refreshToken", alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(alias = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(alias = "expiresIn")]
    pub expires_in: Option<i64>,
    pub user: Option<serde_json::Value>,
    #[serde(rename = "sessionId", alias = "session_id")]
    pub session_id: Option<String>,
}

impl TokenGrant {
    /// `None` when the grant carries no access token.
    pub fn credentials(&self) -> Option<Credentials> {
        let access_token = self.token.clone().filter(|t| !t.is_empty())?;
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        Some(Credentials {
            access_token,
            refresh_token: self.refresh_token.clone(),
            expires_at,
        })
    }
}

/// Access/refresh tokens kept redundantly in a key-value store and cookies.
///
/// Reads prefer the key-value store. Write and clear failures are logged,
/// never returned: losing a persisted token only costs a re-login.
pub struct TokenStore {
    primary: Arc<dyn KeyValueStore>,
    cookies: Arc<CookieJar>,
}

impl TokenStore {
    pub fn new(primary: Arc<dyn KeyValueStore>, cookies: Arc<CookieJar>) -> Self {
        Self { primary, cookies }
    }

    pub fn cookie_jar(&self) -> Arc<CookieJar> {
        self.cookies.clone()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.primary.get(key) {
            Ok(Some(value)) if !value.is_empty() => return Some(value),
            Ok(_) => {}
            Err(e) => warn!(key = key, error = %e, "Failed to read auth storage"),
        }
        self.cookies.get(key).filter(|v| !v.is_empty())
    }

    fn write(&self, key: &str, value: &str, cookie_days: i64) {
        if let Err(e) = self.primary.set(key, value) {
            warn!(key = key, error = %e, "Failed to write auth storage");
        }
        if let Err(e) = self.cookies.set(key, value, Duration::days(cookie_days)) {
            warn!(key = key, error = %e, "Failed to write auth cookie");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.primary.remove(key) {
            warn!(key = key, error = %e, "Failed to remove auth storage key");
        }
        if let Err(e) = self.cookies.remove(key) {
            warn!(key = key, error = %e, "Failed to remove auth cookie");
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(AUTH_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.read(EXPIRES_AT_KEY)?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unparseable token expiry");
                None
            }
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token(),
            expires_at: self.expires_at(),
        })
    }

    pub fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.write(AUTH_TOKEN_KEY, access_token, ACCESS_COOKIE_DAYS);
        if let Some(refresh) = refresh_token {
            self.write(REFRESH_TOKEN_KEY, refresh, REFRESH_COOKIE_DAYS);
        }
        match expires_at {
            Some(expiry) => self.write(EXPIRES_AT_KEY, &expiry.to_rfc3339(), REFRESH_COOKIE_DAYS),
            // A grant without an expiry must not inherit the previous one.
            None => self.remove(EXPIRES_AT_KEY),
        }
        debug!(
            has_refresh = refresh_token.is_some(),
            has_expiry = expires_at.is_some(),
            "Stored auth tokens"
        );
    }

    pub fn set_credentials(&self, credentials: &Credentials) {
        self.set_tokens(
            &credentials.access_token,
            credentials.refresh_token.as_deref(),
            credentials.expires_at,
        );
    }

    /// Keep the logged-in user's profile next to the tokens.
    pub fn set_user_data(&self, user: &serde_json::Value) {
        if let Err(e) = self.primary.set(USER_DATA_KEY, &user.to_string()) {
            warn!(error = %e, "Failed to store user data");
        }
    }

    pub fn user_data(&self) -> Option<serde_json::Value> {
        let raw = self.primary.get(USER_DATA_KEY).ok().flatten()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn set_session_id(&self, session_id: &str) {
        if let Err(e) = self.primary.set(SESSION_ID_KEY, session_id) {
            warn!(error = %e, "Failed to store session id");
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.primary.get(SESSION_ID_KEY).ok().flatten()
    }

    /// Remove every auth key from every backend.
    pub fn clear(&self) {
        for key in ALL_KEYS {
            self.remove(key);
        }
        debug!("Cleared auth state");
    }

    /// True when a token exists and has not expired. An expired token is
    /// purged on the spot.
    pub fn is_valid(&self) -> bool {
        if self.access_token().is_none() {
            return false;
        }
        match self.expires_at() {
            Some(expiry) if Utc::now() >= expiry => {
                debug!(expired_at = %expiry, "Access token expired");
                self.clear();
                false
            }
            _ => true,
        }
    }

    /// Minutes left before the recorded expiry, if any.
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at()
            .map(|e| (e - Utc::now()).num_minutes().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::MemoryStore;

    fn store() -> (TokenStore, Arc<MemoryStore>, Arc<CookieJar>) {
        let primary = Arc::new(MemoryStore::new());
        let cookies = Arc::new(CookieJar::in_memory());
        (
            TokenStore::new(primary.clone(), cookies.clone()),
            primary,
            cookies,
        )
    }

    #[test]
    fn test_set_and_read_tokens() {
        let (tokens, _, _) = store();
        let expiry = Utc::now() + Duration::hours(1);
        tokens.set_tokens("access-1", Some("refresh-1"), Some(expiry));

        let creds = tokens.credentials().unwrap();
        assert_eq!(creds.access_token, "access-1");
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            creds.expires_at.unwrap().timestamp(),
            expiry.timestamp()
        );
        assert!(tokens.is_valid());
    }

    #[test]
    fn test_cookie_fallback_when_primary_cleared() {
        let (tokens, primary, _) = store();
        tokens.set_tokens("access-1", Some("refresh-1"), None);

        primary.remove(AUTH_TOKEN_KEY).unwrap();
        primary.remove(REFRESH_TOKEN_KEY).unwrap();

        assert_eq!(tokens.access_token().as_deref(), Some("access-1"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[test]
    fn test_token_cookies_are_secure_and_strict() {
        let (tokens, _, cookies) = store();
        tokens.set_tokens("a", Some("r"), None);
        let access = cookies.set_cookie_string(AUTH_TOKEN_KEY).unwrap();
        let refresh = cookies.set_cookie_string(REFRESH_TOKEN_KEY).unwrap();
        assert!(access.contains("SameSite=Strict") && access.contains("Secure"));
        assert!(refresh.contains("SameSite=Strict") && refresh.contains("Secure"));
    }

    #[test]
    fn test_no_token_is_invalid() {
        let (tokens, _, _) = store();
        assert!(tokens.access_token().is_none());
        assert!(!tokens.is_valid());
    }

    #[test]
    fn test_expired_token_is_purged() {
        let (tokens, primary, cookies) = store();
        let expired = Utc::now() - Duration::minutes(1);
        tokens.set_tokens("access-1", Some("refresh-1"), Some(expired));

        assert!(!tokens.is_valid());
        assert!(tokens.access_token().is_none());
        assert!(tokens.refresh_token().is_none());
        assert_eq!(primary.get(EXPIRES_AT_KEY).unwrap(), None);
        assert_eq!(cookies.header_string(), "");
    }

    #[test]
    fn test_new_tokens_without_expiry_drop_the_old_one() {
        let (tokens, primary, cookies) = store();
        let expired = Utc::now() - Duration::minutes(1);
        tokens.set_tokens("old", Some("r1"), Some(expired));

        tokens.set_tokens("new", Some("r2"), None);

        assert_eq!(tokens.expires_at(), None);
        assert_eq!(primary.get(EXPIRES_AT_KEY).unwrap(), None);
        assert_eq!(cookies.get(EXPIRES_AT_KEY), None);
        assert!(tokens.is_valid());
        assert_eq!(tokens.access_token().as_deref(), Some("new"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("r2"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (tokens, _, _) = store();
        tokens.set_tokens("access-1", Some("refresh-1"), None);
        tokens.set_user_data(&serde_json::json!({"id": 7}));
        tokens.set_session_id("s-1");

        tokens.clear();
        tokens.clear();

        assert!(tokens.credentials().is_none());
        assert!(tokens.user_data().is_none());
        assert!(tokens.session_id().is_none());
    }

    #[test]
    fn test_token_grant_accepts_both_casings() {
        let camel: TokenGrant = serde_json::from_value(serde_json::json!({
            "accessToken": "a1",
            "refreshToken": "r1",
            "expiresAt": "2030-01-01T00:00:00Z"
        }))
        .unwrap();
        let creds = camel.credentials().unwrap();
        assert_eq!(creds.access_token, "a1");
        assert_eq!(creds.refresh_token.as_deref(), Some("r1"));
        assert_eq!(creds.expires_at.unwrap().to_rfc3339(), "2030-01-01T00:00:00+00:00");

        let snake: TokenGrant = serde_json::from_value(serde_json::json!({
            "token": "a2",
            "refresh_token": "r2",
            "expires_in": 3600
        }))
        .unwrap();
        let creds = snake.credentials().unwrap();
        assert_eq!(creds.refresh_token.as_deref(), Some("r2"));
        assert!(!creds.is_expired());
    }

    #[test]
    fn test_token_grant_without_token() {
        let grant: TokenGrant =
            serde_json::from_value(serde_json::json!({"user": {"id": 1}})).unwrap();
        assert!(grant.credentials().is_none());
    }

    #[test]
    fn test_user_data_roundtrip() {
        let (tokens, _, _) = store();
        tokens.set_user_data(&serde_json::json!({"id": 7, "role": "instructor"}));
        assert_eq!(tokens.user_data().unwrap()["role"], "instructor");
    }
}
