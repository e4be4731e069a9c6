//! Cancellation helpers shared by the retry wrapper, waiter and reader.

use std::future::Future;
use std::time::Duration;

use tether_types::RegistrationName;
use tokio_util::sync::CancellationToken;

use crate::error::{LifecycleError, Result};

/// Run `fut` unless `token` fires first.
pub(crate) async fn or_cancelled<F>(
    token: &CancellationToken,
    name: &RegistrationName,
    fut: F,
) -> Result<F::Output>
where
    F: Future,
{
    if token.is_cancelled() {
        return Err(cancelled(name));
    }

    tokio::select! {
        biased;
        () = token.cancelled() => Err(cancelled(name)),
        output = fut => Ok(output),
    }
}

/// Sleep for `duration` unless `token` fires first.
pub(crate) async fn sleep_or_cancelled(
    token: &CancellationToken,
    name: &RegistrationName,
    duration: Duration,
) -> Result<()> {
    or_cancelled(token, name, tokio::time::sleep(duration)).await
}

fn cancelled(name: &RegistrationName) -> LifecycleError {
    LifecycleError::Cancelled { name: name.clone() }
}
