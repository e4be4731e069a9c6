//! Error types for tether-lifecycle crate.
//!
//! [`LifecycleError`] is what the retry wrapper, waiter and reader return.
//! The controller wraps it in [`OperationError`] so callers see which
//! operation failed for which registration. Propagation delays never show up
//! here: they are absorbed by the retry wrapper.

use std::fmt;
use std::time::Duration;

use tether_backend::BackendError;
use tether_types::{RegistrationHandle, RegistrationName, RegistrationStatus};
use thiserror::Error;

use crate::state::StateStoreError;

/// Errors raised while driving a registration through its lifecycle.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The backend rejected or failed a request.
    #[error("backend request for cluster registration ({name}) failed: {source}")]
    BackendRequestFailed {
        name: RegistrationName,
        #[source]
        source: BackendError,
    },

    /// The registration does not exist where it must.
    #[error("cluster registration ({name}) not found")]
    NotFound { name: RegistrationName },

    /// The registration did not reach a terminal status in time.
    #[error(
        "timeout after {}s waiting for cluster registration ({name}) to become stable (last status: {})",
        .timeout.as_secs(),
        status_label(.last_status)
    )]
    WaitTimeout {
        name: RegistrationName,
        timeout: Duration,
        last_status: Option<RegistrationStatus>,
    },

    /// The backend moved the registration to a failure status.
    #[error("cluster registration ({name}) reached status {status}: {detail}")]
    BackendReportedFailure {
        name: RegistrationName,
        status: RegistrationStatus,
        detail: String,
    },

    /// The caller cancelled the operation.
    #[error("operation on cluster registration ({name}) was cancelled")]
    Cancelled { name: RegistrationName },

    /// Tracked state could not be read or written.
    #[error("tracked state error: {0}")]
    StateStore(#[from] StateStoreError),

    /// The controller was assembled or configured incorrectly.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn status_label(status: &Option<RegistrationStatus>) -> String {
    status
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none observed".to_string())
}

/// Stable discriminant of a [`LifecycleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BackendRequestFailed,
    NotFound,
    WaitTimeout,
    BackendReportedFailure,
    Cancelled,
    StateStore,
    Configuration,
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::BackendRequestFailed { .. } => ErrorKind::BackendRequestFailed,
            LifecycleError::NotFound { .. } => ErrorKind::NotFound,
            LifecycleError::WaitTimeout { .. } => ErrorKind::WaitTimeout,
            LifecycleError::BackendReportedFailure { .. } => ErrorKind::BackendReportedFailure,
            LifecycleError::Cancelled { .. } => ErrorKind::Cancelled,
            LifecycleError::StateStore(_) => ErrorKind::StateStore,
            LifecycleError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Backend error underneath, if any.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            LifecycleError::BackendRequestFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Externally visible lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Delete,
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Delete => write!(f, "delete"),
            Operation::Import => write!(f, "import"),
        }
    }
}

/// A failed controller operation, annotated with what was being done to whom.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct OperationError {
    pub operation: Operation,
    pub name: RegistrationName,
    #[source]
    pub source: LifecycleError,
    /// Set when the backend accepted the registration before the failure;
    /// the backend object may outlive the failed operation.
    pub accepted: Option<RegistrationHandle>,
}

impl OperationError {
    pub fn new(operation: Operation, name: RegistrationName, source: LifecycleError) -> Self {
        Self {
            operation,
            name,
            source,
            accepted: None,
        }
    }

    pub fn with_accepted(mut self, handle: RegistrationHandle) -> Self {
        self.accepted = Some(handle);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}
