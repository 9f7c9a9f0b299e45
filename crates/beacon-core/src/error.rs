//! Error kinds reported to API clients

use axum::http::StatusCode;
use serde::Serialize;
use utoipa::ToSchema;

/// Machine-readable error kind carried in the `error` field of every failure
/// envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub enum ErrorKind {
    /// Malformed or missing input
    ValidationError,
    /// Malformed resource identifier
    InvalidId,
    /// No session exists for the identifier
    SessionNotFound,
    /// Generic missing resource
    NotFound,
    /// Unique constraint violated
    Conflict,
    /// Batch larger than the ingestion limit
    PayloadTooLarge,
    /// Unhandled fault
    InternalServerError,
    /// A handler produced a payload that failed its own output contract
    InternalResponseShapeError,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::ValidationError | ErrorKind::InvalidId => StatusCode::BAD_REQUEST,
            ErrorKind::SessionNotFound | ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::InternalServerError | ErrorKind::InternalResponseShapeError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::InvalidId => "InvalidId",
            ErrorKind::SessionNotFound => "SessionNotFound",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::InternalServerError => "InternalServerError",
            ErrorKind::InternalResponseShapeError => "InternalResponseShapeError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ErrorKind::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::InvalidId.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ErrorKind::InternalResponseShapeError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_serializes_as_name() {
        let value = serde_json::to_value(ErrorKind::SessionNotFound).unwrap();
        assert_eq!(value, serde_json::json!("SessionNotFound"));
        assert_eq!(ErrorKind::Conflict.to_string(), "Conflict");
    }
}
