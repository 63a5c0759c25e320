// Copyright 2026 Modelmesh Contributors.

//! Crate-wide error taxonomy for the middleware.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors raised by any subsystem of the middleware.
#[derive(Debug, Clone, Error)]
pub enum MiddlewareError {
    /// Two ingested entities share an id but are not equal.
    #[error("duplicate id '{id}' with conflicting values")]
    DuplicateIdWithConflict {
        /// The colliding identifier.
        id: String,
    },

    /// A registry lookup exhausted every level of hierarchical fallback.
    #[error("no connection registered for {0}")]
    KeyNotFound(String),

    /// A connector's `connect`, `provide`, `consume`, or `disconnect` failed.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// A `Mapper` or `Formatter` failed to transform a value.
    #[error("mapping error: {0}")]
    MappingError(String),

    /// A workflow body returned an error or panicked.
    #[error("workflow error: {0}")]
    WorkflowError(String),

    /// A workflow invocation was rejected because its concurrency limit was saturated.
    #[error("workflow '{0}' is already running")]
    AlreadyRunning(String),

    /// A workflow run was cancelled before completion.
    #[error("workflow '{0}' was cancelled")]
    Cancelled(String),

    /// `interrupt()` was called on a workflow with no active runs.
    #[error("workflow '{0}' is not running")]
    NotRunning(String),

    /// Fan-out notification to a synced peer failed; never propagated to the caller.
    #[error("reverse fan-out to '{peer}' failed: {reason}")]
    ReverseFanOutFailure {
        /// Id of the peer connector that failed to receive the update.
        peer: String,
        /// The underlying failure reason.
        reason: String,
    },

    /// Generic not-found, used by routers for unknown entity ids.
    #[error("not found: {0}")]
    NotFound(String),

    /// An entity could not yield a stable identifier.
    #[error("no identifier found on value: {0}")]
    NoIdentifier(String),

    /// Caller attempted to register two distinct types with the same simple name.
    #[error("type name collision: '{0}' is already registered")]
    TypeNameCollision(String),
}

/// Result alias used throughout the crate.
pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

impl From<serde_json::Error> for MiddlewareError {
    fn from(err: serde_json::Error) -> Self {
        MiddlewareError::MappingError(err.to_string())
    }
}

impl MiddlewareError {
    /// Status code used by the REST layer when this error escapes a handler.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MiddlewareError::DuplicateIdWithConflict { .. } => StatusCode::BAD_REQUEST,
            MiddlewareError::KeyNotFound(_) => StatusCode::BAD_REQUEST,
            MiddlewareError::ConnectionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MiddlewareError::MappingError(_) => StatusCode::BAD_REQUEST,
            MiddlewareError::WorkflowError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MiddlewareError::AlreadyRunning(_) => StatusCode::BAD_REQUEST,
            MiddlewareError::Cancelled(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MiddlewareError::NotRunning(_) => StatusCode::BAD_REQUEST,
            MiddlewareError::ReverseFanOutFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            MiddlewareError::NotFound(_) => StatusCode::BAD_REQUEST,
            MiddlewareError::NoIdentifier(_) => StatusCode::BAD_REQUEST,
            MiddlewareError::TypeNameCollision(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// True for errors that represent a missing entity or connection.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MiddlewareError::NotFound(_) | MiddlewareError::KeyNotFound(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for MiddlewareError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_maps_to_bad_request() {
        let err = MiddlewareError::DuplicateIdWithConflict {
            id: "example_submodel_id".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "duplicate id 'example_submodel_id' with conflicting values"
        );
    }

    #[test]
    fn connection_error_maps_to_server_error() {
        let err = MiddlewareError::ConnectionError("timeout".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn is_not_found_covers_key_not_found_and_not_found() {
        assert!(MiddlewareError::NotFound("x".into()).is_not_found());
        assert!(MiddlewareError::KeyNotFound("x".into()).is_not_found());
        assert!(!MiddlewareError::AlreadyRunning("wf".into()).is_not_found());
    }

    #[test]
    fn serde_json_error_becomes_mapping_error() {
        let bad = serde_json::from_str::<serde_json::Value>("{ bad json");
        let err: MiddlewareError = bad.unwrap_err().into();
        assert!(matches!(err, MiddlewareError::MappingError(_)));
    }
}
