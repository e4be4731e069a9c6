//! Register with retry on dependency propagation delay.
//!
//! A role created moments before the registration may not be visible to the
//! control-plane service yet. Register attempts that fail only because of
//! that are retried with exponential backoff and jitter until
//! [`PROPAGATION_TIMEOUT`] runs out; any other failure ends the operation at
//! once. When the window is exhausted one last unconditional attempt is made
//! and its outcome is returned as is.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tether_backend::{BackendClient, RegisterClusterInput};
use tether_types::RegistrationHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cancel::{or_cancelled, sleep_or_cancelled};
use crate::error::{LifecycleError, Result};

/// How long Register is retried while a referenced role propagates.
pub const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Delay before the first retry.
pub const PROPAGATION_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Upper bound of the delay between retries.
pub const PROPAGATION_MAX_DELAY: Duration = Duration::from_secs(10);

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Register wrapper that rides out role propagation delays.
#[derive(Clone)]
pub struct PropagationRetry {
    backend: Arc<dyn BackendClient>,
}

impl PropagationRetry {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// Register `input`, retrying while its role is not yet visible.
    #[instrument(skip(self, input, cancel), fields(name = %input.name))]
    pub async fn register(
        &self,
        input: &RegisterClusterInput,
        cancel: &CancellationToken,
    ) -> Result<RegistrationHandle> {
        let name = &input.name;
        let deadline = Instant::now() + PROPAGATION_TIMEOUT;
        let mut delay = PROPAGATION_INITIAL_DELAY;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt = attempt, "Registering cluster");

            match or_cancelled(cancel, name, self.backend.register_cluster(input)).await? {
                Ok(handle) => {
                    info!(handle = %handle, attempt = attempt, "Cluster registered");
                    return Ok(handle);
                }
                Err(e) if e.is_dependency_not_propagated() => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }

                    let pause = jittered(delay).min(deadline - now);
                    warn!(
                        attempt = attempt,
                        error = %e,
                        delay_ms = pause.as_millis() as u64,
                        "Referenced role not visible yet, retrying"
                    );
                    sleep_or_cancelled(cancel, name, pause).await?;

                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * BACKOFF_MULTIPLIER)
                            .min(PROPAGATION_MAX_DELAY.as_secs_f64()),
                    );
                }
                Err(e) => {
                    return Err(LifecycleError::BackendRequestFailed {
                        name: name.clone(),
                        source: e,
                    });
                }
            }
        }

        warn!(
            attempts = attempt,
            window_secs = PROPAGATION_TIMEOUT.as_secs(),
            "Propagation window exhausted, making final attempt"
        );

        match or_cancelled(cancel, name, self.backend.register_cluster(input)).await? {
            Ok(handle) => {
                info!(handle = %handle, "Cluster registered on final attempt");
                Ok(handle)
            }
            Err(e) => {
                error!(error = %e, "Final registration attempt failed");
                Err(LifecycleError::BackendRequestFailed {
                    name: name.clone(),
                    source: e,
                })
            }
        }
    }
}

/// Spread `delay` over 0.5x to 1.5x.
fn jittered(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
