use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, errors: Vec<String> },

    #[error("Access denied: {message}")]
    Forbidden { message: String, errors: Vec<String> },

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        errors: Vec<String>,
    },

    #[error("Request rejected: {message}")]
    Rejected { message: String, errors: Vec<String> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error fields the backend puts in its JSON envelope.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build the typed error for a non-2xx response.
    ///
    /// JSON bodies contribute their `message` and `errors` fields; anything
    /// else is carried as (truncated) text.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .message
            .or(parsed.error)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("Unknown")
                    )
                } else {
                    Self::truncate_body(body)
                }
            });
        let errors = parsed.errors.unwrap_or_default();

        match status.as_u16() {
            401 => ApiError::Unauthorized { message, errors },
            403 => ApiError::Forbidden { message, errors },
            code => ApiError::Http {
                status: code,
                message,
                errors,
            },
        }
    }

    /// Classify a transport error, keeping deadline expiry distinct.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(timeout)
        } else {
            ApiError::Network(err)
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// 401 or 403.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. }
        )
    }

    /// Server-provided error list, empty when there was none.
    pub fn errors(&self) -> &[String] {
        match self {
            ApiError::Unauthorized { errors, .. }
            | ApiError::Forbidden { errors, .. }
            | ApiError::Http { errors, .. }
            | ApiError::Rejected { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Text suitable for showing to an end user: the server's error list
    /// when present, otherwise the error message.
    pub fn user_message(&self) -> String {
        let errors = self.errors();
        if errors.is_empty() {
            match self {
                ApiError::Unauthorized { message, .. }
                | ApiError::Forbidden { message, .. }
                | ApiError::Http { message, .. }
                | ApiError::Rejected { message, .. } => message.clone(),
                other => other.to_string(),
            }
        } else {
            errors.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_reads_envelope_fields() {
        let body = r#"{"success":false,"message":"Invalid data","errors":["email required","name too long"]}"#;
        let err = ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, body);
        match &err {
            ApiError::Http {
                status,
                message,
                errors,
            } => {
                assert_eq!(*status, 422);
                assert_eq!(message, "Invalid data");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.user_message(), "email required, name too long");
    }

    #[test]
    fn test_from_status_auth_classes() {
        assert!(ApiError::from_status(StatusCode::UNAUTHORIZED, "").is_unauthorized());
        let forbidden = ApiError::from_status(StatusCode::FORBIDDEN, "nope");
        assert!(forbidden.is_auth_error());
        assert!(!forbidden.is_unauthorized());
        assert_eq!(forbidden.status(), Some(403));
    }

    #[test]
    fn test_from_status_empty_body_uses_reason() {
        let err = ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.user_message(), "HTTP 503: Service Unavailable");
    }

    #[test]
    fn test_truncate_body_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }
}
