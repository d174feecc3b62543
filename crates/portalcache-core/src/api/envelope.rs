//! Response bodies and the backend's `{ success, data, message, errors }`
//! envelope.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::ApiError;

/// Decoded response body, chosen by `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary(Vec<u8>),
    Empty,
}

/// A successful (2xx) transport response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub body: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Vec<String>>,
}

/// The backend envelope, validated into one of two shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<T> {
    Success { data: T, message: Option<String> },
    Failure { message: String, errors: Vec<String> },
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    /// Unwrap the payload, turning a `success: false` envelope into
    /// [`ApiError::Rejected`].
    pub fn into_result(self) -> Result<T, ApiError> {
        match self {
            ApiResponse::Success { data, .. } => Ok(data),
            ApiResponse::Failure { message, errors } => Err(ApiError::Rejected { message, errors }),
        }
    }
}

impl Response {
    /// Validate the body into an [`ApiResponse`].
    ///
    /// JSON objects with a `success` field are read as envelopes; any other
    /// JSON value is treated as bare data. Text bodies deserialize as a JSON
    /// string, so `ApiResponse<String>` works for plain-text endpoints.
    pub fn into_envelope<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, ApiError> {
        let value = match self.body {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => serde_json::Value::String(text),
            ResponseBody::Empty => serde_json::Value::Null,
            ResponseBody::Binary(_) => {
                return Err(ApiError::InvalidResponse(
                    "Binary body cannot be read as an API envelope".to_string(),
                ))
            }
        };

        let is_envelope = value
            .as_object()
            .map(|o| o.contains_key("success"))
            .unwrap_or(false);

        if !is_envelope {
            return decode(value).map(|data| ApiResponse::Success {
                data,
                message: None,
            });
        }

        let raw: RawEnvelope = serde_json::from_value(value)
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed envelope: {}", e)))?;

        if raw.success {
            let data = decode(raw.data.unwrap_or(serde_json::Value::Null))?;
            Ok(ApiResponse::Success {
                data,
                message: raw.message,
            })
        } else {
            Ok(ApiResponse::Failure {
                message: raw.message.unwrap_or_else(|| "Request failed".to_string()),
                errors: raw.errors.unwrap_or_default(),
            })
        }
    }

    /// Shorthand for `into_envelope()?.into_result()`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        self.into_envelope()?.into_result()
    }
}

fn decode<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|e| ApiError::InvalidResponse(format!("Unexpected payload shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn json_response(value: serde_json::Value) -> Response {
        Response {
            status: StatusCode::OK,
            body: ResponseBody::Json(value),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Role {
        id: u32,
        name: String,
    }

    #[test]
    fn test_success_envelope() {
        let resp = json_response(json!({
            "success": true,
            "data": {"id": 1, "name": "admin"},
            "message": "ok"
        }));
        let envelope: ApiResponse<Role> = resp.into_envelope().unwrap();
        assert_eq!(
            envelope,
            ApiResponse::Success {
                data: Role {
                    id: 1,
                    name: "admin".to_string()
                },
                message: Some("ok".to_string()),
            }
        );
    }

    #[test]
    fn test_failure_envelope_becomes_rejected() {
        let resp = json_response(json!({
            "success": false,
            "message": "Cache key not found",
            "errors": ["missing"]
        }));
        let err = resp.into_data::<serde_json::Value>().unwrap_err();
        match err {
            ApiError::Rejected { message, errors } => {
                assert_eq!(message, "Cache key not found");
                assert_eq!(errors, vec!["missing".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_bare_json_is_data() {
        let resp = json_response(json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]));
        let roles: Vec<Role> = resp.into_data().unwrap();
        assert_eq!(roles.len(), 2);
    }

    #[test]
    fn test_text_body() {
        let resp = Response {
            status: StatusCode::OK,
            body: ResponseBody::Text("pong".to_string()),
        };
        let text: String = resp.into_data().unwrap();
        assert_eq!(text, "pong");
    }

    #[test]
    fn test_wrong_shape_is_invalid_response() {
        let resp = json_response(json!({"success": true, "data": "not a role"}));
        assert!(matches!(
            resp.into_data::<Role>(),
            Err(ApiError::InvalidResponse(_))
        ));
    }
}
