//! Builder for the registration controller.

use std::sync::Arc;

use tether_backend::BackendClient;

use crate::config::LifecycleConfig;
use crate::controller::RegistrationController;
use crate::error::{LifecycleError, Result};
use crate::state::RegistrationStateStore;
use crate::tags::{PassthroughTags, TagTransform};

/// Builder for constructing a [`RegistrationController`] with its collaborators
pub struct RegistrationControllerBuilder {
    backend: Option<Arc<dyn BackendClient>>,
    state_store: Option<Arc<dyn RegistrationStateStore>>,
    tag_transform: Option<Arc<dyn TagTransform>>,
    config: Option<LifecycleConfig>,
}

impl RegistrationControllerBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            state_store: None,
            tag_transform: None,
            config: None,
        }
    }

    /// Set the backend client
    pub fn with_backend(mut self, backend: Arc<dyn BackendClient>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the tracked-state store
    pub fn with_state_store(mut self, store: Arc<dyn RegistrationStateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    /// Set the tag transform (defaults to passing tags through)
    pub fn with_tag_transform(mut self, transform: Arc<dyn TagTransform>) -> Self {
        self.tag_transform = Some(transform);
        self
    }

    /// Set the lifecycle configuration
    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the controller, validating the configuration
    pub fn build(self) -> Result<RegistrationController> {
        let backend = self
            .backend
            .ok_or_else(|| LifecycleError::Configuration("backend required".into()))?;
        let state_store = self
            .state_store
            .ok_or_else(|| LifecycleError::Configuration("state_store required".into()))?;
        let tag_transform = self
            .tag_transform
            .unwrap_or_else(|| Arc::new(PassthroughTags));

        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(RegistrationController::new(
            backend,
            state_store,
            tag_transform,
            config,
        ))
    }
}

impl Default for RegistrationControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::state::InMemoryRegistrationStateStore;
    use std::time::Duration;
    use tether_backend::SimulatedBackend;

    #[test]
    fn test_builder_missing_fields() {
        let result = RegistrationControllerBuilder::new().build();
        assert!(result.is_err());

        let result = RegistrationControllerBuilder::new()
            .with_backend(Arc::new(SimulatedBackend::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_complete() {
        let result = RegistrationControllerBuilder::new()
            .with_backend(Arc::new(SimulatedBackend::new()))
            .with_state_store(Arc::new(InMemoryRegistrationStateStore::new()))
            .build();

        assert!(result.is_ok());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = RegistrationControllerBuilder::new()
            .with_backend(Arc::new(SimulatedBackend::new()))
            .with_state_store(Arc::new(InMemoryRegistrationStateStore::new()))
            .with_config(LifecycleConfig::default().with_create_timeout(Duration::ZERO))
            .build();

        match result {
            Err(e) => assert_eq!(e.kind(), ErrorKind::Configuration),
            Ok(_) => panic!("zero create timeout must be rejected"),
        }
    }
}
