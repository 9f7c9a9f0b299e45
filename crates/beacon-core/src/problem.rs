//! Failure envelope returned to API clients
//!
//! Every error leaves the server as `{ok:false, error:<kind>, issues?:[...]}`.
//! Internal detail is logged where the error is produced, never serialized.

use axum::http::{HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::error::ErrorKind;

/// A single field-level violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Issue {
    /// Dotted path of the offending field
    #[schema(example = "actions.0.timeSpent")]
    pub path: String,
    /// Human readable description of the violation
    #[schema(example = "Number must be less than or equal to 36000")]
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Wire representation of a failure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "ok": false,
    "error": "ValidationError",
    "issues": [{"path": "sessionId", "message": "String must contain at least 8 character(s)"}]
}))]
pub struct ErrorEnvelope {
    pub ok: bool,
    #[schema(example = "ValidationError")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues: Option<Vec<Issue>>,
}

/// Error returned by every handler
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ErrorKind,
    issues: Vec<Issue>,
}

impl ApiError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            issues: Vec::new(),
        }
    }

    pub fn issue(mut self, path: impl Into<String>, message: impl Into<String>) -> Self {
        self.issues.push(Issue::new(path, message));
        self
    }

    pub fn with_issues(mut self, issues: Vec<Issue>) -> Self {
        self.issues.extend(issues);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        // Validation failures always carry an issues array, even when empty
        let issues = if self.kind == ErrorKind::ValidationError || !self.issues.is_empty() {
            Some(self.issues.clone())
        } else {
            None
        };

        ErrorEnvelope {
            ok: false,
            error: self.kind.as_str().to_string(),
            issues,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        for issue in &self.issues {
            write!(f, "; {}: {}", issue.path, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        ApiError::new(kind)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.kind.status();
        let mut response = (status, Json(self.envelope())).into_response();
        response.headers_mut().insert(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        );
        response
    }
}

// Common error builders
pub fn validation_error() -> ApiError {
    ApiError::new(ErrorKind::ValidationError)
}

pub fn invalid_id() -> ApiError {
    ApiError::new(ErrorKind::InvalidId)
}

pub fn not_found() -> ApiError {
    ApiError::new(ErrorKind::NotFound)
}

pub fn session_not_found() -> ApiError {
    ApiError::new(ErrorKind::SessionNotFound)
}

pub fn conflict() -> ApiError {
    ApiError::new(ErrorKind::Conflict)
}

pub fn payload_too_large() -> ApiError {
    ApiError::new(ErrorKind::PayloadTooLarge)
}

pub fn internal_server_error() -> ApiError {
    ApiError::new(ErrorKind::InternalServerError)
}

pub fn response_shape_error() -> ApiError {
    ApiError::new(ErrorKind::InternalResponseShapeError)
}

/// Fallback for unmatched routes
pub async fn route_not_found(uri: Uri) -> ApiError {
    debug!("No route for {}", uri);
    not_found()
}

/// Response used when a handler panics; pass to `CatchPanicLayer::custom`
pub fn panic_response(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    internal_server_error().into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_validation_envelope_always_has_issues() {
        let envelope = validation_error().envelope();
        assert!(!envelope.ok);
        assert_eq!(envelope.error, "ValidationError");
        assert_eq!(envelope.issues, Some(vec![]));
    }

    #[test]
    fn test_not_found_envelope_omits_issues() {
        let value = serde_json::to_value(not_found().envelope()).unwrap();
        assert_eq!(value, serde_json::json!({"ok": false, "error": "NotFound"}));
    }

    #[test]
    fn test_issue_builder_accumulates() {
        let error = validation_error()
            .issue("lat", "Required")
            .with_issues(vec![Issue::new("lon", "Required")]);
        assert_eq!(error.issues().len(), 2);
        assert_eq!(error.to_string(), "ValidationError; lat: Required; lon: Required");
    }

    #[test]
    fn test_into_response_uses_kind_status() {
        let response = payload_too_large().into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = response_shape_error().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
