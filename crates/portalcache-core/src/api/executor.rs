//! Single-shot request execution: URL building, auth header, deadline,
//! body decoding and outcome classification.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use tracing::debug;

use super::envelope::{Response, ResponseBody};
use super::request::{FormPart, RequestDescriptor};
use super::ApiError;
use crate::auth::TokenStore;
use crate::config::RouteOverride;

/// Default request deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Resolves request paths against the configured base and the override table.
#[derive(Debug, Clone)]
pub struct Router {
    base: Url,
    overrides: Vec<(String, Url)>,
}

impl Router {
    pub fn new(base_url: &str, overrides: &[RouteOverride]) -> Result<Self, ApiError> {
        let overrides = overrides
            .iter()
            .map(|o| Ok((normalize_path(&o.prefix), parse_base(&o.base_url)?)))
            .collect::<Result<Vec<_>, ApiError>>()?;
        Ok(Self {
            base: parse_base(base_url)?,
            overrides,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for `path` with `query` appended and URL-encoded.
    pub fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
        let path = normalize_path(path);
        let base = self
            .overrides
            .iter()
            .find(|(prefix, _)| !prefix.is_empty() && path.starts_with(prefix.as_str()))
            .map(|(_, base)| base)
            .unwrap_or(&self.base);

        let mut url = base
            .join(&path)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid path {}: {}", path, e)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Parse a base URL, forcing a trailing slash so `join` appends.
fn parse_base(raw: &str) -> Result<Url, ApiError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash)
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid base URL {}: {}", raw, e)))
}

/// Collapse duplicate slashes and strip the leading `/` and `api/` segment,
/// since the base URL already ends in `/api`.
fn normalize_path(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !last_slash {
                collapsed.push(c);
            }
            last_slash = true;
        } else {
            collapsed.push(c);
            last_slash = false;
        }
    }
    let trimmed = collapsed.trim_start_matches('/');
    let trimmed = trimmed.strip_prefix("api/").unwrap_or(trimmed);
    if trimmed == "api" {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Build a fresh form; reqwest forms are consumed by each send.
fn multipart_form(parts: &[(String, FormPart)]) -> Result<Form, ApiError> {
    parts.iter().try_fold(Form::new(), |form, (name, part)| match part {
        FormPart::Text(value) => Ok(form.text(name.clone(), value.clone())),
        FormPart::File(file) => {
            let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
            if let Some(ref mime) = file.mime {
                part = part.mime_str(mime).map_err(|e| {
                    ApiError::InvalidRequest(format!("Invalid MIME type {}: {}", mime, e))
                })?;
            }
            Ok(form.part(name.clone(), part))
        }
    })
}

/// Executes one request. Does not retry and does not refresh credentials.
/// Clone is cheap: the reqwest client and token store are shared.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    router: Arc<Router>,
    tokens: Arc<TokenStore>,
    default_timeout: Duration,
}

impl RequestExecutor {
    pub fn new(
        client: Client,
        router: Router,
        tokens: Arc<TokenStore>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            client,
            router: Arc::new(router),
            tokens,
            default_timeout,
        }
    }

    /// Build a reqwest client that sends the token store's cookies to the
    /// router's base origin, and nowhere else.
    pub fn build_client(tokens: &TokenStore, router: &Router) -> Result<Client, ApiError> {
        let jar = tokens.cookie_jar();
        jar.bind_origin(router.base());
        Client::builder()
            .cookie_provider(jar)
            .build()
            .map_err(ApiError::Network)
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Execute with whatever access token the store currently holds.
    pub async fn execute(&self, desc: &RequestDescriptor) -> Result<Response, ApiError> {
        let token = if desc.skip_auth {
            None
        } else {
            self.tokens.access_token()
        };
        self.execute_with_token(desc, token.as_deref()).await
    }

    /// Execute with an explicit bearer token (`None` sends no Authorization).
    pub async fn execute_with_token(
        &self,
        desc: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.router.url(&desc.path, &desc.query)?;
        let headers = self.prepare_headers(desc, token)?;
        let timeout = desc.timeout.unwrap_or(self.default_timeout);

        debug!(method = %desc.method, url = %url, "API request");

        let mut request = self
            .client
            .request(desc.method.clone(), url.clone())
            .headers(headers);
        if desc.allows_body() {
            if let Some(ref parts) = desc.form {
                request = request.multipart(multipart_form(parts)?);
            } else if let Some(ref body) = desc.body {
                request = request.json(body);
            }
        }

        let outcome = tokio::time::timeout(timeout, async move {
            let response = request
                .send()
                .await
                .map_err(|e| ApiError::from_transport(e, timeout))?;
            Self::read_response(response, timeout).await
        })
        .await;

        match outcome {
            Ok(result) => {
                if let Err(ref e) = result {
                    debug!(url = %url, error = %e, "API request failed");
                }
                result
            }
            Err(_) => {
                debug!(
                    url = %url,
                    timeout_ms = timeout.as_millis() as u64,
                    "API request timed out"
                );
                Err(ApiError::Timeout(timeout))
            }
        }
    }

    fn prepare_headers(
        &self,
        desc: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in desc.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        // reqwest sets the multipart type with its boundary.
        if desc.is_multipart() {
            headers.remove(header::CONTENT_TYPE);
        }
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidRequest(format!("Invalid bearer token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Decode the body by content type; non-2xx becomes a typed error.
    async fn read_response(
        response: reqwest::Response,
        timeout: Duration,
    ) -> Result<Response, ApiError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_transport(e, timeout))?;

        let body = if bytes.is_empty() {
            ResponseBody::Empty
        } else if content_type.contains("json") {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e))
            })?;
            ResponseBody::Json(value)
        } else if content_type.starts_with("text/") || content_type.is_empty() {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => ResponseBody::Text(text),
                Err(e) => ResponseBody::Binary(e.into_bytes()),
            }
        } else {
            ResponseBody::Binary(bytes.to_vec())
        };

        Ok(Response { status, body })
    }
}
