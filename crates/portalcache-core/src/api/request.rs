//! Per-call request descriptors.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::Serialize;

use super::ApiError;

/// File content for a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
    pub mime: Option<String>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime: None,
        }
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

#[derive(Debug, Clone)]
pub enum FormPart {
    Text(String),
    File(FilePart),
}

/// A logical request, independent of the transport.
///
/// Descriptors are cheap to clone so the refresh coordinator can replay one
/// after renewing credentials.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    /// Multipart parts, rebuilt into a form on every attempt. Takes
    /// precedence over `body`.
    pub form: Option<Vec<(String, FormPart)>>,
    pub query: Vec<(String, String)>,
    /// Overrides the executor's default deadline.
    pub timeout: Option<Duration>,
    /// Send without an Authorization header.
    pub skip_auth: bool,
    /// A 401 on this call is returned as-is instead of triggering a refresh.
    pub skip_auth_refresh: bool,
    /// Transient failures are retried with backoff.
    pub retryable: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            form: None,
            query: Vec::new(),
            timeout: None,
            skip_auth: false,
            skip_auth_refresh: false,
            retryable: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn text_part(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((name.into(), FormPart::Text(value.into())));
        self
    }

    pub fn file_part(mut self, name: impl Into<String>, file: FilePart) -> Self {
        self.form
            .get_or_insert_with(Vec::new)
            .push((name.into(), FormPart::File(file)));
        self
    }

    pub fn is_multipart(&self) -> bool {
        self.form.is_some()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, ApiError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Login and refresh calls: no bearer token, no 401 interception.
    pub fn unauthenticated(mut self) -> Self {
        self.skip_auth = true;
        self.skip_auth_refresh = true;
        self
    }

    pub fn skip_auth_refresh(mut self) -> Self {
        self.skip_auth_refresh = true;
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// GET and HEAD never carry a body.
    pub fn allows_body(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

/// `base` followed by `segments`, each percent-encoded as exactly one path
/// segment. Empty and dot segments are rejected.
pub fn segment_path(base: &str, segments: &[&str]) -> Result<String, ApiError> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
        return Err(ApiError::InvalidRequest(format!("Invalid path segment {:?}", bad)));
    }
    let mut url = Url::parse("http://segments.local")
        .and_then(|root| root.join(base))
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid path {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidRequest(format!("Path {} cannot have segments", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.path().to_string())
}
