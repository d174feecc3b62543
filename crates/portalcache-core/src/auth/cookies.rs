//! Cookie backend for auth state.
//!
//! The jar belongs to the single API origin the client talks to: cookies are
//! keyed by name, only sent to the bound origin, and only accepted from it.
//! It doubles as the reqwest cookie provider, which sends the auth cookies
//! along with every API request.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::Duration;
use cookie::time::{Duration as CookieDuration, OffsetDateTime};
use cookie::{Cookie, SameSite};
use reqwest::header::HeaderValue;
use reqwest::Url;
use tracing::{debug, warn};

fn is_expired(cookie: &Cookie<'_>, now: OffsetDateTime) -> bool {
    cookie.expires_datetime().is_some_and(|e| e <= now)
}

/// Secure cookies go over https, or plain http to the local machine.
fn is_secure_origin(url: &Url) -> bool {
    url.scheme() == "https" || matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
}

pub struct CookieJar {
    cookies: Mutex<BTreeMap<String, Cookie<'static>>>,
    origin: RwLock<Option<Url>>,
    path: Option<PathBuf>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CookieJar {
    pub fn in_memory() -> Self {
        Self {
            cookies: Mutex::new(BTreeMap::new()),
            origin: RwLock::new(None),
            path: None,
        }
    }

    /// Jar backed by a JSON file of `Set-Cookie` strings. Expired and
    /// unparseable cookies are dropped while loading.
    pub fn persistent(path: PathBuf) -> Result<Self> {
        let stored: BTreeMap<String, String> = if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read cookie file")?;
            serde_json::from_str(&contents).context("Failed to parse cookie file")?
        } else {
            BTreeMap::new()
        };

        let now = OffsetDateTime::now_utc();
        let mut cookies = BTreeMap::new();
        for (name, raw) in stored {
            match Cookie::parse(raw) {
                Ok(cookie) if !is_expired(&cookie, now) => {
                    cookies.insert(name, cookie);
                }
                Ok(_) => {}
                Err(e) => warn!(cookie = %name, error = %e, "Dropping unreadable stored cookie"),
            }
        }

        Ok(Self {
            cookies: Mutex::new(cookies),
            origin: RwLock::new(None),
            path: Some(path),
        })
    }

    /// Scope the jar to the origin (scheme, host, port) of `url`.
    pub fn bind_origin(&self, url: &Url) {
        let mut origin = self.origin.write().unwrap_or_else(PoisonError::into_inner);
        *origin = Some(url.clone());
    }

    fn is_api_origin(&self, url: &Url) -> bool {
        let origin = self.origin.read().unwrap_or_else(PoisonError::into_inner);
        origin.as_ref().is_some_and(|o| o.origin() == url.origin())
    }

    /// Store a `Secure; SameSite=Strict; Path=/` cookie living for `max_age`.
    pub fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<()> {
        let expires = OffsetDateTime::now_utc() + CookieDuration::seconds(max_age.num_seconds());
        let cookie = Cookie::build((name.to_string(), value.to_string()))
            .path("/")
            .secure(true)
            .same_site(SameSite::Strict)
            .expires(expires)
            .build();
        self.insert(cookie)
    }

    /// Current value of a live cookie.
    pub fn get(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies
            .get(name)
            .filter(|c| !is_expired(c, OffsetDateTime::now_utc()))
            .map(|c| c.value().to_string())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if cookies.remove(name).is_some() {
            self.persist(&cookies)?;
        }
        Ok(())
    }

    /// `name=value; name2=value2` for every live cookie.
    pub fn header_string(&self) -> String {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc();
        cookies
            .values()
            .filter(|c| !is_expired(c, now))
            .map(|c| c.stripped().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Render a stored cookie in `Set-Cookie` form.
    pub fn set_cookie_string(&self, name: &str) -> Option<String> {
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        cookies.get(name).map(|c| c.to_string())
    }

    /// Insert or replace; an already expired cookie deletes its name instead.
    fn insert(&self, mut cookie: Cookie<'static>) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        // Max-Age is relative to receipt, so pin it to an absolute expiry.
        if let Some(max_age) = cookie.max_age() {
            cookie.set_expires(now + max_age);
            cookie.set_max_age(None::<CookieDuration>);
        }

        let mut cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        if is_expired(&cookie, now) {
            cookies.remove(cookie.name());
        } else {
            cookies.insert(cookie.name().to_string(), cookie);
        }
        self.persist(&cookies)
    }

    fn persist(&self, cookies: &BTreeMap<String, Cookie<'static>>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored: BTreeMap<&str, String> = cookies
            .iter()
            .map(|(name, c)| (name.as_str(), c.to_string()))
            .collect();
        let contents = serde_json::to_string_pretty(&stored)?;
        std::fs::write(path, contents).context("Failed to write cookie file")?;
        Ok(())
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        if !self.is_api_origin(url) {
            debug!(
                host = url.host_str().unwrap_or(""),
                "Ignoring cookies from outside the API origin"
            );
            return;
        }
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            match Cookie::parse(raw.to_string()) {
                Ok(cookie) => {
                    let name = cookie.name().to_string();
                    debug!(cookie = %name, "Cookie set by server");
                    if let Err(e) = self.insert(cookie) {
                        warn!(cookie = %name, error = %e, "Failed to store server cookie");
                    }
                }
                Err(e) => debug!(error = %e, "Ignoring malformed Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        if !self.is_api_origin(url) {
            return None;
        }
        let cookies = self.cookies.lock().unwrap_or_else(PoisonError::into_inner);
        let now = OffsetDateTime::now_utc();
        let secure_ok = is_secure_origin(url);
        let header = cookies
            .values()
            .filter(|c| !is_expired(c, now))
            .filter(|c| secure_ok || c.secure() != Some(true))
            .filter(|c| url.path().starts_with(c.path().unwrap_or("/")))
            .map(|c| c.stripped().to_string())
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            HeaderValue::from_str(&header).ok()
        }
    }
}
