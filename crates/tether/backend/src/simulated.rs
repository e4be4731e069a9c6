//! In-memory simulated control-plane backend.
//!
//! Behaves like the real service closely enough to drive the lifecycle
//! controller end to end: registrations progress through a scripted status
//! sequence, roles can be made invisible for a number of attempts, errors can
//! be injected per operation and every call is counted. Not suitable for
//! production use.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tether_types::{
    ClientRequestToken, ClusterHealth, ClusterIssue, ClusterShape, ConnectorConfigResponse,
    RegistrationHandle, RegistrationRecord, RegistrationStatus,
};
use tracing::debug;
use uuid::Uuid;

use crate::client::{BackendClient, RegisterClusterInput};
use crate::error::{BackendError, BackendResult};

/// How long an activation code stays valid.
const ACTIVATION_VALIDITY_DAYS: i64 = 3;

/// Operations of the simulated service, used for counters and injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulatedOperation {
    Register,
    Describe,
    Deregister,
}

/// Persisted form of one simulated registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedRegistration {
    /// Record as Describe reports it.
    pub record: RegistrationRecord,

    /// Token of the Register call that created it.
    pub token: Option<ClientRequestToken>,

    /// Statuses still to be reported, one per Describe.
    pub remaining_script: Vec<RegistrationStatus>,
}

/// Serializable snapshot of the simulated world.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatedWorld {
    pub registrations: Vec<SimulatedRegistration>,
}

/// Simulated backend.
pub struct SimulatedBackend {
    /// Live registrations keyed by handle.
    registrations: DashMap<String, SimulatedRegistration>,

    /// Roles that stay invisible for the given number of Register attempts.
    hidden_roles: DashMap<String, u32>,

    /// Status scripts installed ahead of Register, keyed by name.
    scripts: DashMap<String, Vec<RegistrationStatus>>,

    /// Issues attached to a registration when it is created, keyed by name.
    issues: DashMap<String, Vec<ClusterIssue>>,

    /// Handles for which Describe answers NotFound for a number of calls.
    describe_blind: DashMap<String, u32>,

    /// Errors to return from the next calls of an operation.
    injected: DashMap<SimulatedOperation, VecDeque<BackendError>>,

    /// Call counters keyed by operation and name/handle.
    calls: DashMap<(SimulatedOperation, String), u32>,

    /// Script used when none was installed for a name.
    default_script: Vec<RegistrationStatus>,

    /// Artificial latency of Describe.
    describe_latency: Option<Duration>,

    /// Region used to build ARNs.
    region: String,
}

impl SimulatedBackend {
    /// Create a simulated backend whose registrations go CREATING, PENDING, ACTIVE.
    pub fn new() -> Self {
        Self {
            registrations: DashMap::new(),
            hidden_roles: DashMap::new(),
            scripts: DashMap::new(),
            issues: DashMap::new(),
            describe_blind: DashMap::new(),
            injected: DashMap::new(),
            calls: DashMap::new(),
            default_script: vec![
                RegistrationStatus::Creating,
                RegistrationStatus::Pending,
                RegistrationStatus::Active,
            ],
            describe_latency: None,
            region: "us-west-2".to_string(),
        }
    }

    /// Restore a backend from a snapshot.
    pub fn from_snapshot(world: SimulatedWorld) -> Self {
        let backend = Self::new();
        for registration in world.registrations {
            backend
                .registrations
                .insert(registration.record.name.to_string(), registration);
        }
        backend
    }

    /// Replace the default status script.
    pub fn with_default_script(mut self, script: Vec<RegistrationStatus>) -> Self {
        if !script.is_empty() {
            self.default_script = script;
        }
        self
    }

    /// Delay every Describe by `latency`.
    pub fn with_describe_latency(mut self, latency: Duration) -> Self {
        self.describe_latency = Some(latency);
        self
    }

    /// Set the region used in ARNs.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Keep `role_arn` invisible for the next `attempts` Register calls.
    pub fn hide_role_for(&self, role_arn: impl Into<String>, attempts: u32) {
        self.hidden_roles.insert(role_arn.into(), attempts);
    }

    /// Statuses Describe reports for `name`, one per call; the last one sticks.
    pub fn script_status(&self, name: impl Into<String>, script: Vec<RegistrationStatus>) {
        self.scripts.insert(name.into(), script);
    }

    /// Attach a health issue to `name` when it gets registered.
    pub fn report_issue(&self, name: impl Into<String>, code: &str, message: &str) {
        self.issues.entry(name.into()).or_default().push(ClusterIssue {
            code: code.to_string(),
            message: message.to_string(),
            resource_ids: Vec::new(),
        });
    }

    /// Answer NotFound to the next `calls` Describe calls for `handle`.
    pub fn hide_from_describe(&self, handle: impl Into<String>, calls: u32) {
        self.describe_blind.insert(handle.into(), calls);
    }

    /// Fail the next call of `operation` with `error`.
    pub fn inject_error(&self, operation: SimulatedOperation, error: BackendError) {
        self.injected.entry(operation).or_default().push_back(error);
    }

    /// Remove a registration behind the controller's back.
    pub fn remove_out_of_band(&self, handle: &str) -> bool {
        self.registrations.remove(handle).is_some()
    }

    /// Number of calls of `operation` addressed to `key` (name or handle).
    pub fn call_count(&self, operation: SimulatedOperation, key: &str) -> u32 {
        self.calls
            .get(&(operation, key.to_string()))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn register_calls(&self, name: &str) -> u32 {
        self.call_count(SimulatedOperation::Register, name)
    }

    pub fn describe_calls(&self, handle: &str) -> u32 {
        self.call_count(SimulatedOperation::Describe, handle)
    }

    pub fn deregister_calls(&self, handle: &str) -> u32 {
        self.call_count(SimulatedOperation::Deregister, handle)
    }

    /// Whether a registration currently exists for `handle`.
    pub fn contains(&self, handle: &str) -> bool {
        self.registrations.contains_key(handle)
    }

    /// Snapshot of all registrations, for persistence.
    pub fn snapshot(&self) -> SimulatedWorld {
        let mut registrations: Vec<SimulatedRegistration> =
            self.registrations.iter().map(|r| r.clone()).collect();
        registrations.sort_by(|a, b| a.record.name.cmp(&b.record.name));
        SimulatedWorld { registrations }
    }

    fn count(&self, operation: SimulatedOperation, key: &str) {
        *self.calls.entry((operation, key.to_string())).or_insert(0) += 1;
    }

    fn take_injected(&self, operation: SimulatedOperation) -> Option<BackendError> {
        self.injected
            .get_mut(&operation)
            .and_then(|mut queue| queue.pop_front())
    }

    fn role_hidden(&self, role_arn: &str) -> bool {
        match self.hidden_roles.get_mut(role_arn) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn describe_hidden(&self, handle: &str) -> bool {
        match self.describe_blind.get_mut(handle) {
            Some(mut remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn new_record(&self, input: &RegisterClusterInput) -> RegistrationRecord {
        let now = Utc::now();
        let name = input.name.to_string();
        let health = self
            .issues
            .get(&name)
            .map(|issues| ClusterHealth {
                issues: issues.clone(),
            });

        RegistrationRecord {
            name: input.name.clone(),
            arn: Some(format!(
                "arn:aws:eks:{}:000000000000:cluster/{}",
                self.region, name
            )),
            status: RegistrationStatus::Creating,
            connector_config: Some(ConnectorConfigResponse {
                provider: input.connector_config.provider,
                role_arn: input.connector_config.role_arn.clone(),
                activation_id: Some(Uuid::new_v4().to_string()),
                activation_code: Some(Uuid::new_v4().simple().to_string()),
                activation_expiry: Some(now + chrono::Duration::days(ACTIVATION_VALIDITY_DAYS)),
            }),
            tags: input.tags.clone(),
            created_at: Some(now),
            shape: ClusterShape::default(),
            health,
        }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for SimulatedBackend {
    async fn register_cluster(
        &self,
        input: &RegisterClusterInput,
    ) -> BackendResult<RegistrationHandle> {
        let name = input.name.to_string();
        self.count(SimulatedOperation::Register, &name);

        if let Some(err) = self.take_injected(SimulatedOperation::Register) {
            return Err(err);
        }

        if self.role_hidden(&input.connector_config.role_arn) {
            return Err(BackendError::role_not_propagated(
                &input.connector_config.role_arn,
            ));
        }

        if let Some(existing) = self.registrations.get(&name) {
            let replay = input.client_request_token.is_some()
                && existing.token == input.client_request_token;
            if replay {
                debug!(name = %name, "Register replayed with the same request token");
                return Ok(RegistrationHandle::new(name));
            }
            return Err(BackendError::resource_in_use(format!(
                "Cluster already exists with name: {}",
                name
            )));
        }

        let script = self
            .scripts
            .get(&name)
            .map(|s| s.clone())
            .unwrap_or_else(|| self.default_script.clone());

        self.registrations.insert(
            name.clone(),
            SimulatedRegistration {
                record: self.new_record(input),
                token: input.client_request_token.clone(),
                remaining_script: script,
            },
        );

        debug!(name = %name, "Simulated registration created");
        Ok(RegistrationHandle::new(name))
    }

    async fn describe_cluster(
        &self,
        handle: &RegistrationHandle,
    ) -> BackendResult<RegistrationRecord> {
        let key = handle.as_str();
        self.count(SimulatedOperation::Describe, key);

        if let Some(latency) = self.describe_latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(err) = self.take_injected(SimulatedOperation::Describe) {
            return Err(err);
        }

        let not_found = || BackendError::not_found(format!("No cluster found for name: {}.", key));

        if self.describe_hidden(key) {
            return Err(not_found());
        }

        let mut registration = self.registrations.get_mut(key).ok_or_else(not_found)?;
        if !registration.remaining_script.is_empty() {
            let next = registration.remaining_script.remove(0);
            registration.record.status = next;
        }

        Ok(registration.record.clone())
    }

    async fn deregister_cluster(&self, handle: &RegistrationHandle) -> BackendResult<()> {
        let key = handle.as_str();
        self.count(SimulatedOperation::Deregister, key);

        if let Some(err) = self.take_injected(SimulatedOperation::Deregister) {
            return Err(err);
        }

        self.registrations
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BackendError::not_found(format!("No cluster found for name: {}.", key)))
    }
}
