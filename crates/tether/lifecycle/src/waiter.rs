//! Poll-until-stable waiter.
//!
//! After Register the backend keeps working on the registration
//! asynchronously. The waiter polls Describe, one call at a time, and
//! classifies each reported status as pending, target reached or failed until
//! a terminal status shows up or the deadline passes.
//!
//! Statuses outside the known vocabulary are treated as pending: the backend
//! may introduce new intermediate states at any time.

use std::sync::Arc;
use std::time::Duration;

use tether_backend::BackendClient;
use tether_types::{RegistrationHandle, RegistrationRecord, RegistrationStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cancel::{or_cancelled, sleep_or_cancelled};
use crate::config::{LifecycleConfig, PollConfig};
use crate::error::{LifecycleError, Result};

/// Classification of a reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Keep polling.
    Pending,
    /// Stop, success.
    Reached,
    /// Stop, failure.
    Failed,
}

/// Which statuses end the wait, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    targets: Vec<RegistrationStatus>,
    failures: Vec<RegistrationStatus>,
}

impl StatusPolicy {
    /// Wait until `target` is reported.
    ///
    /// Waiting for PENDING also accepts ACTIVE, since a registration whose
    /// agent connects quickly may skip past PENDING between two polls.
    pub fn until(target: RegistrationStatus) -> Self {
        let mut targets = vec![target.clone()];
        if target == RegistrationStatus::Pending {
            targets.push(RegistrationStatus::Active);
        }

        Self {
            targets,
            failures: vec![RegistrationStatus::Failed],
        }
    }

    pub fn classify(&self, status: &RegistrationStatus) -> StatusClass {
        if self.targets.contains(status) {
            StatusClass::Reached
        } else if self.failures.contains(status) {
            StatusClass::Failed
        } else {
            StatusClass::Pending
        }
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self::until(RegistrationStatus::Active)
    }
}

/// Polls a registration until it is stable.
#[derive(Clone)]
pub struct StabilityWaiter {
    backend: Arc<dyn BackendClient>,
    poll: PollConfig,
    policy: StatusPolicy,
    not_found_checks: u32,
}

impl StabilityWaiter {
    /// Create a waiter using the polling settings of `config`.
    pub fn new(backend: Arc<dyn BackendClient>, config: &LifecycleConfig) -> Self {
        Self {
            backend,
            poll: config.poll.clone(),
            policy: StatusPolicy::until(config.wait_target.clone()),
            not_found_checks: config.not_found_checks,
        }
    }

    /// Override the status policy.
    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Poll `handle` until it reaches a terminal status or `timeout` elapses.
    ///
    /// Returns the record that carried the target status. A backend-reported
    /// failure and a timeout are distinct errors; no record is returned with
    /// either.
    #[instrument(skip(self, handle, cancel), fields(handle = %handle))]
    pub async fn wait_until_stable(
        &self,
        handle: &RegistrationHandle,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RegistrationRecord> {
        let name = handle.display_name();
        let deadline = Instant::now().checked_add(timeout).ok_or_else(|| {
            LifecycleError::Configuration(format!(
                "wait timeout of {}s is out of range",
                timeout.as_secs()
            ))
        })?;
        let timed_out = |last_status: Option<RegistrationStatus>| LifecycleError::WaitTimeout {
            name: handle.display_name(),
            timeout,
            last_status,
        };

        if !self.poll.initial_delay.is_zero() {
            let pause = self
                .poll
                .initial_delay
                .min(deadline.saturating_duration_since(Instant::now()));
            sleep_or_cancelled(cancel, &name, pause).await?;
        }

        let mut interval = self.poll.first_interval();
        let mut last_status: Option<RegistrationStatus> = None;
        let mut not_found = 0u32;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let described = or_cancelled(
                cancel,
                &name,
                tokio::time::timeout_at(deadline, self.backend.describe_cluster(handle)),
            )
            .await?;

            match described {
                Err(_elapsed) => {
                    warn!(polls = polls, "Describe outlived the wait deadline");
                    return Err(timed_out(last_status));
                }
                Ok(Ok(record)) => {
                    not_found = 0;
                    match self.policy.classify(&record.status) {
                        StatusClass::Reached => {
                            info!(polls = polls, status = %record.status, "Registration is stable");
                            return Ok(record);
                        }
                        StatusClass::Failed => {
                            let detail = record
                                .failure_detail()
                                .unwrap_or_else(|| "no failure detail reported".to_string());
                            warn!(status = %record.status, detail = %detail, "Registration failed");
                            return Err(LifecycleError::BackendReportedFailure {
                                name,
                                status: record.status,
                                detail,
                            });
                        }
                        StatusClass::Pending => {
                            debug!(polls = polls, status = %record.status, "Registration not stable yet");
                            last_status = Some(record.status);
                        }
                    }
                }
                Ok(Err(e)) if e.is_not_found() => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        warn!(checks = not_found, "Registration never became visible");
                        return Err(LifecycleError::NotFound { name });
                    }
                    debug!(checks = not_found, "Registration not visible yet");
                }
                Ok(Err(e)) if e.kind.is_transient() => {
                    warn!(error = %e, "Transient describe failure, continuing to poll");
                }
                Ok(Err(e)) => {
                    return Err(LifecycleError::BackendRequestFailed { name, source: e });
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(last_status));
            }

            sleep_or_cancelled(cancel, &name, interval.min(deadline - now)).await?;
            interval = self.poll.next_interval(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;
    use tether_backend::{BackendError, RegisterClusterInput, SimulatedBackend, SimulatedOperation};
    use tether_types::RegistrationStatus::{Active, Creating, Failed, Pending};
    use tether_types::{ClientRequestToken, ConnectorConfigRequest, ConnectorProvider, Tags};

    async fn registered(backend: &SimulatedBackend, name: &str) -> RegistrationHandle {
        backend
            .register_cluster(&RegisterClusterInput {
                name: name.into(),
                connector_config: ConnectorConfigRequest {
                    provider: ConnectorProvider::Aks,
                    role_arn: "arn:aws:iam::123456789012:role/connector".into(),
                },
                tags: Tags::new(),
                client_request_token: Some(ClientRequestToken::generate()),
            })
            .await
            .unwrap()
    }

    fn waiter(backend: Arc<SimulatedBackend>) -> StabilityWaiter {
        StabilityWaiter::new(backend, &LifecycleConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_pending_active_takes_three_polls() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![Pending, Pending, Active]);
        let handle = registered(&backend, "edge").await;

        let record = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, Active);
        assert_eq!(backend.describe_calls("edge"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_is_reported_failure_not_timeout() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![Pending, Failed]);
        backend.report_issue("edge", "AccessDenied", "connector role cannot be assumed");
        let handle = registered(&backend, "edge").await;

        let err = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::BackendReportedFailure);
        assert!(err.to_string().contains("connector role cannot be assumed"));
        assert_eq!(backend.describe_calls("edge"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_leaving_pending_times_out() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![Pending]);
        let handle = registered(&backend, "edge").await;

        let started = Instant::now();
        let err = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            LifecycleError::WaitTimeout {
                timeout,
                last_status,
                ..
            } => {
                assert_eq!(timeout, Duration::from_secs(60));
                assert_eq!(last_status, Some(Pending));
            }
            other => panic!("expected WaitTimeout, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_secs(60));
        // 0s, 5s, 15s, 35s, then the capped sleep lands on the deadline.
        assert_eq!(backend.describe_calls("edge"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_is_an_error() {
        let backend = Arc::new(SimulatedBackend::new());
        let handle = registered(&backend, "edge").await;

        let err = waiter(backend.clone())
            .wait_until_stable(
                &handle,
                Duration::from_secs(u64::MAX),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(backend.describe_calls("edge"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_keeps_polling() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status(
            "edge",
            vec![
                Creating,
                RegistrationStatus::Unknown("VERIFYING".into()),
                Active,
            ],
        );
        let handle = registered(&backend, "edge").await;

        let record = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, Active);
        assert_eq!(backend.describe_calls("edge"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_tolerated_up_to_limit() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![Active]);
        let handle = registered(&backend, "edge").await;
        backend.hide_from_describe("edge", 2);

        let record = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.status, Active);
        assert_eq!(backend.describe_calls("edge"), 3);

        let mut config = LifecycleConfig::default();
        config.not_found_checks = 1;
        backend.hide_from_describe("edge", 5);
        let err = StabilityWaiter::new(backend.clone(), &config)
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_continue_and_fatal_errors_stop() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![Active]);
        let handle = registered(&backend, "edge").await;

        backend.inject_error(
            SimulatedOperation::Describe,
            BackendError::throttled("Rate exceeded"),
        );
        let record = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.status, Active);

        backend.inject_error(
            SimulatedOperation::Describe,
            BackendError::classify("AccessDeniedException", "not authorized"),
        );
        let err = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendRequestFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_describe_is_cut_at_deadline() {
        let backend =
            Arc::new(SimulatedBackend::new().with_describe_latency(Duration::from_secs(3600)));
        let handle = registered(&backend, "edge").await;

        let err = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(60), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
        assert_eq!(backend.describe_calls("edge"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let backend = Arc::new(SimulatedBackend::new());
        backend.script_status("edge", vec![Pending]);
        let handle = registered(&backend, "edge").await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let err = waiter(backend.clone())
            .wait_until_stable(&handle, Duration::from_secs(600), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(backend.describe_calls("edge"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_override_stops_at_pending() {
        let backend = Arc::new(SimulatedBackend::new());
        let handle = registered(&backend, "edge").await;

        let record = waiter(backend.clone())
            .with_policy(StatusPolicy::until(Pending))
            .wait_until_stable(&handle, Duration::from_secs(600), &CancellationToken::new())
            .await
            .unwrap();

        // Default script is CREATING, PENDING, ACTIVE.
        assert_eq!(record.status, Pending);
        assert_eq!(backend.describe_calls("edge"), 2);
    }

    #[test]
    fn test_pending_target_accepts_active() {
        let policy = StatusPolicy::until(Pending);
        assert_eq!(policy.classify(&Creating), StatusClass::Pending);
        assert_eq!(policy.classify(&Pending), StatusClass::Reached);
        assert_eq!(policy.classify(&Active), StatusClass::Reached);
        assert_eq!(policy.classify(&Failed), StatusClass::Failed);
    }

    proptest! {
        #[test]
        fn prop_unknown_statuses_are_never_terminal(raw in "[A-Z]{3,12}") {
            let status: RegistrationStatus = raw.parse().unwrap();
            prop_assume!(!status.is_known());
            prop_assert_eq!(StatusPolicy::default().classify(&status), StatusClass::Pending);
        }
    }
}
