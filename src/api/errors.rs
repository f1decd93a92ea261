//! API error handling.
//!
//! Structured error responses with HTTP status codes and request tracking.

use crate::errors::EngineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, BAD_REQUEST, CONFLICT, INTERNAL_ERROR, ...)
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    /// Resource rejections: pool full or closed, duplicate commitment,
    /// insufficient funds, exhausted allowance.
    Conflict(String),
    InternalError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn conflict(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::Conflict(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    pub fn service_unavailable(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::ServiceUnavailable(message),
            request_id,
        }
    }

    /// Map an engine error onto the closest HTTP semantics. Validation
    /// failures are the caller's fault; resource rejections are conflicts;
    /// integrity and storage faults stay opaque 500s.
    pub fn from_engine(request_id: String, error: EngineError) -> Self {
        let message = error.to_string();
        match error {
            EngineError::BetOutOfRange { .. }
            | EngineError::MalformedSeedMaterial(_)
            | EngineError::NotCommitted(_)
            | EngineError::InvalidTransition { .. } => Self::bad_request(request_id, message),

            EngineError::InsufficientFunds { .. }
            | EngineError::DailyLimitExceeded(_)
            | EngineError::PoolFull(_)
            | EngineError::PoolClosed(_)
            | EngineError::DuplicateCommitment { .. } => Self::conflict(request_id, message),

            EngineError::RoundNotFound(_) => Self::not_found(request_id, message),

            EngineError::CommitmentMismatch(_)
            | EngineError::OutcomeMismatch(_)
            | EngineError::UnknownReservation(_)
            | EngineError::Storage(_)
            | EngineError::Configuration(_) => Self::internal_error(request_id, message),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => {
                write!(f, "[{}] Bad Request: {}", self.request_id, msg)
            }
            ApiErrorKind::Conflict(msg) => write!(f, "[{}] Conflict: {}", self.request_id, msg),
            ApiErrorKind::InternalError(msg) => {
                write!(f, "[{}] Internal Error: {}", self.request_id, msg)
            }
            ApiErrorKind::ServiceUnavailable(msg) => {
                write!(f, "[{}] Service Unavailable: {}", self.request_id, msg)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiErrorKind::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiErrorKind::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
            ApiErrorKind::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_engine_error_mapping() {
        let id = Uuid::new_v4();
        let cases = [
            (
                EngineError::RoundNotFound(id),
                matches!(
                    ApiError::from_engine("r".into(), EngineError::RoundNotFound(id)).kind,
                    ApiErrorKind::NotFound(_)
                ),
            ),
            (
                EngineError::PoolFull(id),
                matches!(
                    ApiError::from_engine("r".into(), EngineError::PoolFull(id)).kind,
                    ApiErrorKind::Conflict(_)
                ),
            ),
            (
                EngineError::NotCommitted(id),
                matches!(
                    ApiError::from_engine("r".into(), EngineError::NotCommitted(id)).kind,
                    ApiErrorKind::BadRequest(_)
                ),
            ),
            (
                EngineError::Storage("boom".into()),
                matches!(
                    ApiError::from_engine("r".into(), EngineError::Storage("boom".into())).kind,
                    ApiErrorKind::InternalError(_)
                ),
            ),
        ];
        for (_, matched) in cases {
            assert!(matched);
        }
    }
}
