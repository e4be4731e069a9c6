//! Reconciling reader.
//!
//! A NotFound from Describe means different things depending on when it is
//! seen. Right after a successful create it is a hard error: the registration
//! we just waited on vanished. On a routine refresh it means the registration
//! was removed out of band, and the caller should stop tracking it.

use std::sync::Arc;

use tether_backend::BackendClient;
use tether_types::{RegistrationHandle, RegistrationRecord};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cancel::or_cancelled;
use crate::error::{LifecycleError, Result};

/// Context a read happens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Final read of a create.
    NewlyCreated,
    /// Routine refresh of tracked state.
    Refresh,
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Present(RegistrationRecord),
    /// Gone from the backend; tracked state should be dropped.
    Absent,
}

impl ReadOutcome {
    pub fn into_record(self) -> Option<RegistrationRecord> {
        match self {
            ReadOutcome::Present(record) => Some(record),
            ReadOutcome::Absent => None,
        }
    }
}

#[derive(Clone)]
pub struct ReconcilingReader {
    backend: Arc<dyn BackendClient>,
}

impl ReconcilingReader {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// Describe `handle` once and interpret the answer for `mode`.
    #[instrument(skip(self, handle, cancel), fields(handle = %handle))]
    pub async fn read_record(
        &self,
        handle: &RegistrationHandle,
        mode: ReadMode,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome> {
        let name = handle.display_name();

        match or_cancelled(cancel, &name, self.backend.describe_cluster(handle)).await? {
            Ok(record) => {
                debug!(status = %record.status, "Read cluster registration");
                Ok(ReadOutcome::Present(record))
            }
            Err(e) if e.is_not_found() => match mode {
                ReadMode::NewlyCreated => Err(LifecycleError::NotFound { name }),
                ReadMode::Refresh => {
                    warn!("Cluster registration not found, removing from state");
                    Ok(ReadOutcome::Absent)
                }
            },
            Err(e) => Err(LifecycleError::BackendRequestFailed { name, source: e }),
        }
    }
}
