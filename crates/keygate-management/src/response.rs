use serde_json::Value;

use crate::error::ApiError;

/// Status and optional JSON body handed back to the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error` message of a failed response.
    pub fn error_message(&self) -> Option<&str> {
        self.body.as_ref()?.get("error")?.as_str()
    }

    /// Serialized body, empty for 204.
    pub fn body_string(&self) -> String {
        self.body
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default()
    }
}

impl From<ApiError> for ApiResponse {
    fn from(e: ApiError) -> Self {
        ApiResponse::json(e.status_code(), e.body())
    }
}
