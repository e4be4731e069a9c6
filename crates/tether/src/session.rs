//! CLI session: controller wiring over persisted local state
//!
//! Each invocation restores the simulated backend from `backend.json` in the
//! state directory and tracks registrations in `registrations.json`, so that
//! separate invocations observe the same world.

use crate::config::CliConfig;
use crate::error::CliResult;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tether_backend::{SimulatedBackend, SimulatedWorld};
use tether_lifecycle::{
    DefaultTags, JsonFileStateStore, RegistrationController, RegistrationControllerBuilder,
};
use tether_types::{RegistrationHandle, RegistrationName};
use tracing::debug;

const BACKEND_FILE: &str = "backend.json";
const REGISTRATIONS_FILE: &str = "registrations.json";

/// Controller plus the local files backing it
pub struct Session {
    state_dir: PathBuf,
    backend: Arc<SimulatedBackend>,
    controller: RegistrationController,
}

impl Session {
    /// Open a session rooted at `state_dir`
    pub async fn open(state_dir: &Path, config: &CliConfig) -> CliResult<Self> {
        let backend_path = state_dir.join(BACKEND_FILE);
        let world = match tokio::fs::read(&backend_path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice::<SimulatedWorld>(&bytes)?,
            Ok(_) => SimulatedWorld::default(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SimulatedWorld::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %backend_path.display(),
            registrations = world.registrations.len(),
            "Restored simulated backend"
        );

        let backend = Arc::new(SimulatedBackend::from_snapshot(world));
        let controller = RegistrationControllerBuilder::new()
            .with_backend(backend.clone())
            .with_state_store(Arc::new(JsonFileStateStore::new(
                state_dir.join(REGISTRATIONS_FILE),
            )))
            .with_tag_transform(Arc::new(DefaultTags::new(config.default_tags.clone())))
            .with_config(config.lifecycle_config())
            .build()?;

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            backend,
            controller,
        })
    }

    pub fn controller(&self) -> &RegistrationController {
        &self.controller
    }

    /// Backend handle for a registration name.
    ///
    /// Prefers the handle recorded in tracked state; untracked names are
    /// assumed to be their own handle.
    pub async fn resolve(&self, name: &str) -> CliResult<RegistrationHandle> {
        let wanted = RegistrationName::new(name);
        let tracked = self.controller.tracked().await?;

        Ok(tracked
            .into_iter()
            .find(|t| t.record.name == wanted)
            .map(|t| t.handle)
            .unwrap_or_else(|| RegistrationHandle::new(name)))
    }

    /// Write the simulated backend back to disk
    pub async fn persist(&self) -> CliResult<()> {
        tokio::fs::create_dir_all(&self.state_dir).await?;

        let path = self.state_dir.join(BACKEND_FILE);
        let bytes = serde_json::to_vec_pretty(&self.backend.snapshot())?;
        tokio::fs::write(&path, bytes).await?;

        debug!(path = %path.display(), "Persisted simulated backend");
        Ok(())
    }
}
