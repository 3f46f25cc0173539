//! Typed error hierarchy for Dealboard.
//!
//! Every failure that crosses the remote-service boundary is normalized into
//! [`BoardError`] right after the call returns, so the mirror, projector and
//! controller never inspect raw HTTP responses.

use serde::Serialize;
use thiserror::Error;

use dealboard_common::SchemaError;

/// Errors surfaced by the remote pipeline service and the board core.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BoardError {
    /// No response from the remote service (connect failure, timeout, broken body).
    #[error("Network error: {0}")]
    Transport(String),

    /// The remote service answered with a non-success status.
    #[error("{status}: {message}")]
    ServiceRejected {
        status: u16,
        message: String,
        correlation_id: Option<String>,
    },

    /// A deal or stage referenced by an operation is absent.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// No confirmed session, or the remote service rejected our credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

impl BoardError {
    pub fn deal_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Deal",
            id: id.into(),
        }
    }

    pub fn stage_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Stage",
            id: id.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// HTTP status used when the error is returned by the proxy server.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Transport(_) => 502,
            Self::ServiceRejected { status, .. } => *status,
            Self::NotFound { .. } => 404,
            Self::Unauthorized(_) => 401,
            Self::InvalidInput(_) => 400,
        }
    }

    /// The single error shape handed to clients: status plus message.
    pub fn body(&self) -> ErrorBody {
        let (message, correlation_id) = match self {
            Self::ServiceRejected {
                message,
                correlation_id,
                ..
            } => (message.clone(), correlation_id.clone()),
            other => (other.to_string(), None),
        };
        ErrorBody {
            status: self.status_code(),
            message,
            correlation_id,
        }
    }
}

impl From<SchemaError> for BoardError {
    fn from(err: SchemaError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Serialized error payload, `{"status", "message", "correlationId"}`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_kind_and_id() {
        let err = BoardError::deal_not_found("42");
        match &err {
            BoardError::NotFound { kind, id } => {
                assert_eq!(*kind, "Deal");
                assert_eq!(id, "42");
            }
            _ => panic!("Expected NotFound"),
        }
        assert_eq!(err.to_string(), "Deal 42 not found");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn service_rejected_keeps_remote_status_and_message() {
        let err = BoardError::ServiceRejected {
            status: 429,
            message: "You have reached your secondly limit.".into(),
            correlation_id: Some("abc-123".into()),
        };
        assert_eq!(err.status_code(), 429);
        let body = err.body();
        assert_eq!(body.status, 429);
        assert_eq!(body.message, "You have reached your secondly limit.");
        assert_eq!(body.correlation_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn transport_maps_to_bad_gateway() {
        let err = BoardError::Transport("connection refused".into());
        assert_eq!(err.status_code(), 502);
        assert!(err.body().message.contains("connection refused"));
    }

    #[test]
    fn body_omits_missing_correlation_id() {
        let body = BoardError::Unauthorized("session expired".into()).body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], 401);
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn schema_errors_become_invalid_input() {
        let err: BoardError = SchemaError::MissingName.into();
        assert!(matches!(err, BoardError::InvalidInput(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn unauthorized_is_detectable() {
        assert!(BoardError::Unauthorized("x".into()).is_unauthorized());
        assert!(!BoardError::Transport("x".into()).is_unauthorized());
    }
}
