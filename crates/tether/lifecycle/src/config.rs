//! Lifecycle controller configuration.
//!
//! Defines the caller-tunable parts of the registration lifecycle: creation
//! timeout, polling cadence and reconciliation switches. The propagation retry
//! window is a fixed constant, see [`crate::retry::PROPAGATION_TIMEOUT`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_types::RegistrationStatus;

use crate::error::{LifecycleError, Result};

/// Polls are never spaced closer than this, whatever the configuration says.
pub const MIN_POLL_FLOOR: Duration = Duration::from_secs(1);

/// Longest creation timeout accepted.
pub const MAX_CREATE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for the registration lifecycle controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long Create waits for the registration to become stable.
    #[serde(with = "duration_secs")]
    pub create_timeout: Duration,

    /// Polling cadence of the stability waiter.
    pub poll: PollConfig,

    /// Consecutive NotFound answers tolerated while waiting.
    pub not_found_checks: u32,

    /// Status Create waits for.
    pub wait_target: RegistrationStatus,

    /// Treat NotFound on Deregister as already deleted.
    pub delete_tolerates_not_found: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(20 * 60),
            poll: PollConfig::default(),
            not_found_checks: 20,
            wait_target: RegistrationStatus::Active,
            delete_tolerates_not_found: true,
        }
    }
}

impl LifecycleConfig {
    /// Set the creation timeout.
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    /// Set the polling cadence.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Set the status Create waits for.
    pub fn with_wait_target(mut self, target: RegistrationStatus) -> Self {
        self.wait_target = target;
        self
    }

    /// Reject configurations the controller cannot run with.
    pub fn validate(&self) -> Result<()> {
        check_create_timeout(self.create_timeout)?;

        if self.poll.multiplier < 1.0 {
            return Err(LifecycleError::Configuration(format!(
                "poll multiplier must be at least 1.0, got {}",
                self.poll.multiplier
            )));
        }

        if self.poll.max_interval < self.poll.min_interval {
            return Err(LifecycleError::Configuration(
                "poll max_interval must not be below min_interval".into(),
            ));
        }

        if !matches!(
            self.wait_target,
            RegistrationStatus::Pending | RegistrationStatus::Active
        ) {
            return Err(LifecycleError::Configuration(format!(
                "{} cannot be used as wait target",
                self.wait_target
            )));
        }

        Ok(())
    }
}

/// Reject creation timeouts outside `(0, MAX_CREATE_TIMEOUT]`.
pub(crate) fn check_create_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(LifecycleError::Configuration(
            "create_timeout must be greater than zero".into(),
        ));
    }

    if timeout > MAX_CREATE_TIMEOUT {
        return Err(LifecycleError::Configuration(format!(
            "create_timeout of {}s exceeds the maximum of {}s",
            timeout.as_secs(),
            MAX_CREATE_TIMEOUT.as_secs()
        )));
    }

    Ok(())
}

/// Polling cadence of the stability waiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay before the first Describe.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,

    /// Interval after the first non-terminal poll.
    #[serde(with = "duration_secs")]
    pub min_interval: Duration,

    /// Upper bound of the interval.
    #[serde(with = "duration_secs")]
    pub max_interval: Duration,

    /// Growth factor applied after every non-terminal poll.
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            min_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl PollConfig {
    /// Fixed interval polling.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            min_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
        }
    }

    /// Interval to sleep after the first non-terminal poll.
    pub fn first_interval(&self) -> Duration {
        self.min_interval.max(MIN_POLL_FLOOR)
    }

    /// Interval following `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.multiplier.max(1.0);
        let capped = grown.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped).max(MIN_POLL_FLOOR)
    }
}

/// Serde helper for durations expressed in whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
