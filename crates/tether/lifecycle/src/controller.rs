//! Registration lifecycle controller.
//!
//! The externally visible operation set: create, read, delete and import.
//! Create runs register (with propagation retry), wait until stable and a
//! final read strictly in sequence; any failure aborts the whole operation
//! and nothing is recorded in tracked state. A registration the backend
//! already accepted is not rolled back when the wait fails.

use std::sync::Arc;
use std::time::Duration;

use tether_backend::{BackendClient, RegisterClusterInput};
use tether_types::{ClientRequestToken, RegistrationHandle, RegistrationName, RegistrationRequest};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::cancel::or_cancelled;
use crate::config::{check_create_timeout, LifecycleConfig};
use crate::error::{LifecycleError, Operation, OperationError, Result};
use crate::reader::{ReadMode, ReadOutcome, ReconcilingReader};
use crate::retry::PropagationRetry;
use crate::state::{RegistrationStateStore, TrackedRegistration};
use crate::tags::TagTransform;
use crate::waiter::StabilityWaiter;

/// Result of a controller operation.
pub type OperationResult<T> = std::result::Result<T, OperationError>;

/// Drives cluster registrations through their lifecycle.
pub struct RegistrationController {
    backend: Arc<dyn BackendClient>,
    store: Arc<dyn RegistrationStateStore>,
    tags: Arc<dyn TagTransform>,
    retry: PropagationRetry,
    waiter: StabilityWaiter,
    reader: ReconcilingReader,
    config: LifecycleConfig,
}

impl RegistrationController {
    pub(crate) fn new(
        backend: Arc<dyn BackendClient>,
        store: Arc<dyn RegistrationStateStore>,
        tags: Arc<dyn TagTransform>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            retry: PropagationRetry::new(backend.clone()),
            waiter: StabilityWaiter::new(backend.clone(), &config),
            reader: ReconcilingReader::new(backend.clone()),
            backend,
            store,
            tags,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Create a registration, waiting up to the configured create timeout.
    pub async fn create(
        &self,
        request: &RegistrationRequest,
        cancel: &CancellationToken,
    ) -> OperationResult<TrackedRegistration> {
        self.create_with_timeout(request, self.config.create_timeout, cancel)
            .await
    }

    /// Create a registration, waiting up to `timeout` for it to become stable.
    #[instrument(skip(self, request, cancel), fields(name = %request.name))]
    pub async fn create_with_timeout(
        &self,
        request: &RegistrationRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> OperationResult<TrackedRegistration> {
        let mut accepted = None;
        let result = match check_create_timeout(timeout) {
            Ok(()) => self.run_create(request, timeout, &mut accepted, cancel).await,
            Err(e) => Err(e),
        };
        annotate(Operation::Create, &request.name, result).map_err(|e| match accepted {
            Some(handle) => e.with_accepted(handle),
            None => e,
        })
    }

    async fn run_create(
        &self,
        request: &RegistrationRequest,
        timeout: Duration,
        accepted: &mut Option<RegistrationHandle>,
        cancel: &CancellationToken,
    ) -> Result<TrackedRegistration> {
        let token = ClientRequestToken::generate();
        let input = RegisterClusterInput {
            name: request.name.clone(),
            connector_config: request.connector_config.clone(),
            tags: self.tags.apply(&request.tags),
            client_request_token: Some(token.clone()),
        };

        info!(
            provider = %request.connector_config.provider,
            token = %token,
            "Creating cluster registration"
        );

        let handle = self.retry.register(&input, cancel).await?;
        *accepted = Some(handle.clone());

        if let Err(e) = self.waiter.wait_until_stable(&handle, timeout, cancel).await {
            warn!(
                handle = %handle,
                "Registration was accepted by the backend but did not become stable; it is not removed"
            );
            return Err(e);
        }

        let record = self
            .reader
            .read_record(&handle, ReadMode::NewlyCreated, cancel)
            .await?
            .into_record()
            .ok_or_else(|| LifecycleError::NotFound {
                name: request.name.clone(),
            })?;

        let tracked = TrackedRegistration::new(handle, Some(request.clone()), record);
        self.store.save(&tracked).await?;

        info!(handle = %tracked.handle, status = %tracked.record.status, "Cluster registration created");
        Ok(tracked)
    }

    /// Refresh a registration from the backend.
    ///
    /// Returns `None` when the registration no longer exists; it is then
    /// dropped from tracked state.
    #[instrument(skip(self, handle, cancel), fields(handle = %handle))]
    pub async fn read(
        &self,
        handle: &RegistrationHandle,
        cancel: &CancellationToken,
    ) -> OperationResult<Option<TrackedRegistration>> {
        let result = self.run_read(handle, cancel).await;
        annotate(Operation::Read, &handle.display_name(), result)
    }

    async fn run_read(
        &self,
        handle: &RegistrationHandle,
        cancel: &CancellationToken,
    ) -> Result<Option<TrackedRegistration>> {
        match self
            .reader
            .read_record(handle, ReadMode::Refresh, cancel)
            .await?
        {
            ReadOutcome::Absent => {
                self.store.remove(handle).await?;
                Ok(None)
            }
            ReadOutcome::Present(record) => {
                let tracked = match self.store.get(handle).await? {
                    Some(existing) => existing.refreshed(record),
                    None => TrackedRegistration::new(handle.clone(), None, record),
                };
                self.store.save(&tracked).await?;
                Ok(Some(tracked))
            }
        }
    }

    /// Deregister a registration and stop tracking it.
    ///
    /// There is no wait for the registration to disappear.
    #[instrument(skip(self, handle, cancel), fields(handle = %handle))]
    pub async fn delete(
        &self,
        handle: &RegistrationHandle,
        cancel: &CancellationToken,
    ) -> OperationResult<()> {
        let result = self.run_delete(handle, cancel).await;
        annotate(Operation::Delete, &handle.display_name(), result)
    }

    async fn run_delete(&self, handle: &RegistrationHandle, cancel: &CancellationToken) -> Result<()> {
        let name = handle.display_name();

        match or_cancelled(cancel, &name, self.backend.deregister_cluster(handle)).await? {
            Ok(()) => info!("Cluster registration deregistered"),
            Err(e) if e.is_not_found() && self.config.delete_tolerates_not_found => {
                info!("Cluster registration already gone")
            }
            Err(e) => return Err(LifecycleError::BackendRequestFailed { name, source: e }),
        }

        self.store.remove(handle).await?;
        Ok(())
    }

    /// Start tracking a registration that already exists on the backend.
    #[instrument(skip(self, handle, cancel), fields(handle = %handle))]
    pub async fn import(
        &self,
        handle: &RegistrationHandle,
        cancel: &CancellationToken,
    ) -> OperationResult<TrackedRegistration> {
        let result = self.run_import(handle, cancel).await;
        annotate(Operation::Import, &handle.display_name(), result)
    }

    async fn run_import(
        &self,
        handle: &RegistrationHandle,
        cancel: &CancellationToken,
    ) -> Result<TrackedRegistration> {
        let record = match self
            .reader
            .read_record(handle, ReadMode::Refresh, cancel)
            .await?
        {
            ReadOutcome::Present(record) => record,
            ReadOutcome::Absent => {
                return Err(LifecycleError::NotFound {
                    name: handle.display_name(),
                })
            }
        };

        let tracked = match self.store.get(handle).await? {
            Some(existing) => existing.refreshed(record),
            None => TrackedRegistration::new(handle.clone(), None, record),
        };
        self.store.save(&tracked).await?;

        info!(status = %tracked.record.status, "Cluster registration imported");
        Ok(tracked)
    }

    /// Tracked registrations, without consulting the backend.
    pub async fn tracked(&self) -> Result<Vec<TrackedRegistration>> {
        Ok(self.store.list().await?)
    }
}

fn annotate<T>(
    operation: Operation,
    name: &RegistrationName,
    result: Result<T>,
) -> OperationResult<T> {
    result.map_err(|source| {
        error!(operation = %operation, error = %source, "Cluster registration operation failed");
        OperationError::new(operation, name.clone(), source)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::RegistrationControllerBuilder;
    use crate::error::ErrorKind;
    use crate::state::InMemoryRegistrationStateStore;
    use crate::tags::DefaultTags;
    use tether_backend::{BackendError, SimulatedBackend, SimulatedOperation};
    use tether_types::{ConnectorProvider, RegistrationStatus, Tags};

    const ROLE: &str = "arn:aws:iam::123456789012:role/connector";

    fn controller(
        backend: Arc<SimulatedBackend>,
        store: Arc<InMemoryRegistrationStateStore>,
        config: LifecycleConfig,
    ) -> RegistrationController {
        RegistrationControllerBuilder::new()
            .with_backend(backend)
            .with_state_store(store)
            .with_config(config)
            .build()
            .unwrap()
    }

    fn request(name: &str) -> RegistrationRequest {
        RegistrationRequest::new(name, ConnectorProvider::Rancher, ROLE).with_tag("team", "edge")
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_reuses_one_token_across_retries() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.hide_role_for(ROLE, 2);
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend.clone(), store.clone(), LifecycleConfig::default());

        let tracked = ctrl
            .create(&request("edge"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tracked.record.status, RegistrationStatus::Active);
        assert_eq!(backend.register_calls("edge"), 3);
        let world = backend.snapshot();
        assert!(world.registrations[0].token.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tag_transform_runs_before_register() {
        let backend = Arc::new(SimulatedBackend::new());
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let defaults: Tags = [("owner".to_string(), "infra".to_string())].into();
        let ctrl = RegistrationControllerBuilder::new()
            .with_backend(backend.clone())
            .with_state_store(store)
            .with_tag_transform(Arc::new(DefaultTags::new(defaults)))
            .build()
            .unwrap();

        let tracked = ctrl
            .create(&request("edge"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tracked.record.tags.get("owner").map(String::as_str), Some("infra"));
        assert_eq!(tracked.record.tags.get("team").map(String::as_str), Some("edge"));
        // The stored request keeps what the caller asked for.
        let stored = tracked.request.unwrap();
        assert!(!stored.tags.contains_key("owner"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_wait_records_nothing_and_leaves_backend_object() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![RegistrationStatus::Pending]);
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend.clone(), store.clone(), LifecycleConfig::default());

        let err = ctrl
            .create_with_timeout(
                &request("edge"),
                Duration::from_secs(30),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.operation, Operation::Create);
        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
        assert_eq!(err.accepted.as_ref().map(|h| h.as_str()), Some("edge"));
        assert!(store.is_empty());
        assert!(backend.contains("edge"));
        assert_eq!(backend.deregister_calls("edge"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_lost_while_waiting_is_marked_accepted() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.hide_from_describe("edge", 100);
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend.clone(), store.clone(), LifecycleConfig::default());

        let err = ctrl
            .create(&request("edge"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.accepted.as_ref().map(|h| h.as_str()), Some("edge"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_create_timeout_is_rejected() {
        let backend = Arc::new(SimulatedBackend::new());
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend.clone(), store.clone(), LifecycleConfig::default());

        for timeout in [Duration::ZERO, Duration::from_secs(u64::MAX)] {
            let err = ctrl
                .create_with_timeout(&request("edge"), timeout, &CancellationToken::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration);
            assert!(err.accepted.is_none());
        }

        assert_eq!(backend.register_calls("edge"), 0);
        assert!(store.is_empty());

        let built = RegistrationControllerBuilder::new()
            .with_backend(backend)
            .with_state_store(store)
            .with_config(
                LifecycleConfig::default().with_create_timeout(Duration::from_secs(u64::MAX)),
            )
            .build();
        assert!(built.is_err());
    }

    #[tokio::test]
    async fn test_delete_of_missing_registration() {
        let backend = Arc::new(SimulatedBackend::new());
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let handle = RegistrationHandle::new("ghost");

        let lenient = controller(backend.clone(), store.clone(), LifecycleConfig::default());
        assert!(lenient.delete(&handle, &CancellationToken::new()).await.is_ok());

        let mut strict_config = LifecycleConfig::default();
        strict_config.delete_tolerates_not_found = false;
        let strict = controller(backend.clone(), store, strict_config);
        let err = strict
            .delete(&handle, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.operation, Operation::Delete);
        assert_eq!(err.kind(), ErrorKind::BackendRequestFailed);
        assert_eq!(backend.deregister_calls("ghost"), 2);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_tracked_state() {
        let backend = Arc::new(SimulatedBackend::new().with_default_script(vec![
            RegistrationStatus::Active,
        ]));
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend.clone(), store.clone(), LifecycleConfig::default());
        let tracked = ctrl
            .create(&request("edge"), &CancellationToken::new())
            .await
            .unwrap();

        backend.inject_error(
            SimulatedOperation::Deregister,
            BackendError::resource_in_use("Cluster has attached nodegroups"),
        );
        let err = ctrl
            .delete(&tracked.handle, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BackendRequestFailed);
        assert_eq!(store.len(), 1);
        assert!(backend.contains("edge"));
    }

    #[tokio::test]
    async fn test_read_keeps_originating_request() {
        let backend = Arc::new(SimulatedBackend::new().with_default_script(vec![
            RegistrationStatus::Active,
        ]));
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend, store, LifecycleConfig::default());
        let created = ctrl
            .create(&request("edge"), &CancellationToken::new())
            .await
            .unwrap();

        let refreshed = ctrl
            .read(&created.handle, &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refreshed.request, created.request);
        assert_eq!(ctrl.tracked().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_create_makes_no_calls() {
        let backend = Arc::new(SimulatedBackend::new());
        let store = Arc::new(InMemoryRegistrationStateStore::new());
        let ctrl = controller(backend.clone(), store.clone(), LifecycleConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ctrl.create(&request("edge"), &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.accepted.is_none());
        assert_eq!(backend.register_calls("edge"), 0);
        assert!(store.is_empty());
    }
}
