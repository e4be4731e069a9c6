//! Error types for tether-backend crate.
//!
//! Backend failures are classified once, here, into a stable
//! [`BackendErrorKind`]. Callers match on the kind and never on error text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Service error codes understood by the classifier.
pub mod codes {
    pub const INVALID_REQUEST: &str = "InvalidRequestException";
    pub const INVALID_PARAMETER: &str = "InvalidParameterException";
    pub const RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
    pub const RESOURCE_IN_USE: &str = "ResourceInUseException";
    pub const THROTTLING: &str = "ThrottlingException";
    pub const TOO_MANY_REQUESTS: &str = "TooManyRequestsException";
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailableException";
    pub const SERVER: &str = "ServerException";
}

/// Message fragment the service uses when a referenced role is not yet visible.
pub const NOT_EXISTING_ROLE: &str = "Not existing role";

/// Stable classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendErrorKind {
    /// The addressed registration does not exist.
    NotFound,

    /// A referenced dependency (e.g. an access role) has not propagated yet.
    DependencyNotPropagated,

    /// The request was rejected as invalid.
    InvalidRequest,

    /// The name is already taken by another registration.
    ResourceInUse,

    /// The service is rate limiting this caller.
    Throttled,

    /// The service is temporarily unavailable.
    Unavailable,

    /// Anything else.
    Other,
}

impl BackendErrorKind {
    /// Whether repeating the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendErrorKind::Throttled | BackendErrorKind::Unavailable)
    }
}

/// A failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Classification callers match on.
    pub kind: BackendErrorKind,

    /// Service error code as returned on the wire.
    pub code: String,

    /// Service error message.
    pub message: String,
}

impl BackendError {
    /// Classify a raw service error.
    pub fn classify(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();

        let kind = match code.as_str() {
            codes::INVALID_REQUEST if message.contains(NOT_EXISTING_ROLE) => {
                BackendErrorKind::DependencyNotPropagated
            }
            codes::INVALID_REQUEST | codes::INVALID_PARAMETER => BackendErrorKind::InvalidRequest,
            codes::RESOURCE_NOT_FOUND => BackendErrorKind::NotFound,
            codes::RESOURCE_IN_USE => BackendErrorKind::ResourceInUse,
            codes::THROTTLING | codes::TOO_MANY_REQUESTS => BackendErrorKind::Throttled,
            codes::SERVICE_UNAVAILABLE | codes::SERVER => BackendErrorKind::Unavailable,
            _ => BackendErrorKind::Other,
        };

        Self {
            kind,
            code,
            message,
        }
    }

    /// Registration does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::classify(codes::RESOURCE_NOT_FOUND, message)
    }

    /// Referenced role is not visible to the service yet.
    pub fn role_not_propagated(role_arn: &str) -> Self {
        Self::classify(
            codes::INVALID_REQUEST,
            format!("{}: {}", NOT_EXISTING_ROLE, role_arn),
        )
    }

    /// Request rejected as invalid.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::classify(codes::INVALID_REQUEST, message)
    }

    /// Name already taken.
    pub fn resource_in_use(message: impl Into<String>) -> Self {
        Self::classify(codes::RESOURCE_IN_USE, message)
    }

    /// Caller is being rate limited.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::classify(codes::THROTTLING, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == BackendErrorKind::NotFound
    }

    pub fn is_dependency_not_propagated(&self) -> bool {
        self.kind == BackendErrorKind::DependencyNotPropagated
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;
