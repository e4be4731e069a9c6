//! Backend client trait
//!
//! The control-plane service is reached through this trait only. Transport,
//! credentials and wire format live behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_types::{
    ClientRequestToken, ConnectorConfigRequest, RegistrationHandle, RegistrationName,
    RegistrationRecord, Tags,
};

use crate::error::BackendResult;

/// Input of a Register call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClusterInput {
    /// Name to register under.
    pub name: RegistrationName,

    /// Connector settings.
    pub connector_config: ConnectorConfigRequest,

    /// Tags after the tag transform has been applied.
    pub tags: Tags,

    /// Idempotency token; replays with the same token return the same handle.
    pub client_request_token: Option<ClientRequestToken>,
}

/// Remote operations of the control-plane service.
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Register an external cluster.
    async fn register_cluster(
        &self,
        input: &RegisterClusterInput,
    ) -> BackendResult<RegistrationHandle>;

    /// Describe a registration.
    async fn describe_cluster(
        &self,
        handle: &RegistrationHandle,
    ) -> BackendResult<RegistrationRecord>;

    /// Deregister a cluster.
    async fn deregister_cluster(&self, handle: &RegistrationHandle) -> BackendResult<()>;
}
