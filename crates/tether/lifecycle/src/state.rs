//! Tracked registration state.
//!
//! The controller records what it believes exists so that later reads can
//! reconcile against the backend. Create writes only after every stage has
//! succeeded; a failed create leaves nothing behind here.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tether_types::{RegistrationHandle, RegistrationRecord, RegistrationRequest};
use tokio::sync::Mutex;

/// A registration the controller tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRegistration {
    /// Backend identity.
    pub handle: RegistrationHandle,

    /// Request it was created from; absent for imported registrations.
    pub request: Option<RegistrationRequest>,

    /// Last record observed from the backend.
    pub record: RegistrationRecord,

    /// When the record was observed.
    pub observed_at: DateTime<Utc>,
}

impl TrackedRegistration {
    pub fn new(
        handle: RegistrationHandle,
        request: Option<RegistrationRequest>,
        record: RegistrationRecord,
    ) -> Self {
        Self {
            handle,
            request,
            record,
            observed_at: Utc::now(),
        }
    }

    /// Replace the observed record, keeping the originating request.
    pub fn refreshed(mut self, record: RegistrationRecord) -> Self {
        self.record = record;
        self.observed_at = Utc::now();
        self
    }
}

/// State store errors
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Store for tracked registrations.
#[async_trait]
pub trait RegistrationStateStore: Send + Sync {
    /// Save or replace a tracked registration.
    async fn save(&self, tracked: &TrackedRegistration) -> Result<(), StateStoreError>;

    /// Get a tracked registration by handle.
    async fn get(
        &self,
        handle: &RegistrationHandle,
    ) -> Result<Option<TrackedRegistration>, StateStoreError>;

    /// Stop tracking a registration. Returns whether it was tracked.
    async fn remove(&self, handle: &RegistrationHandle) -> Result<bool, StateStoreError>;

    /// All tracked registrations, ordered by handle.
    async fn list(&self) -> Result<Vec<TrackedRegistration>, StateStoreError>;
}

/// In-memory implementation for development and tests
pub struct InMemoryRegistrationStateStore {
    entries: DashMap<RegistrationHandle, TrackedRegistration>,
}

impl InMemoryRegistrationStateStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryRegistrationStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationStateStore for InMemoryRegistrationStateStore {
    async fn save(&self, tracked: &TrackedRegistration) -> Result<(), StateStoreError> {
        self.entries.insert(tracked.handle.clone(), tracked.clone());
        Ok(())
    }

    async fn get(
        &self,
        handle: &RegistrationHandle,
    ) -> Result<Option<TrackedRegistration>, StateStoreError> {
        Ok(self.entries.get(handle).map(|t| t.clone()))
    }

    async fn remove(&self, handle: &RegistrationHandle) -> Result<bool, StateStoreError> {
        Ok(self.entries.remove(handle).is_some())
    }

    async fn list(&self) -> Result<Vec<TrackedRegistration>, StateStoreError> {
        let mut all: Vec<TrackedRegistration> = self.entries.iter().map(|t| t.clone()).collect();
        all.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(all)
    }
}

/// JSON file backed store.
///
/// The whole file is rewritten on every change; writes go to a sibling
/// temporary file first and are renamed into place.
pub struct JsonFileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

type StateFile = BTreeMap<RegistrationHandle, TrackedRegistration>;

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StateFile, StateStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StateFile::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StateStoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::new()),
            Err(source) => Err(StateStoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn persist(&self, state: &StateFile) -> Result<(), StateStoreError> {
        let io_err = |source| StateStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(state).map_err(|source| StateStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl RegistrationStateStore for JsonFileStateStore {
    async fn save(&self, tracked: &TrackedRegistration) -> Result<(), StateStoreError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        state.insert(tracked.handle.clone(), tracked.clone());
        self.persist(&state).await
    }

    async fn get(
        &self,
        handle: &RegistrationHandle,
    ) -> Result<Option<TrackedRegistration>, StateStoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(handle))
    }

    async fn remove(&self, handle: &RegistrationHandle) -> Result<bool, StateStoreError> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let removed = state.remove(handle).is_some();
        if removed {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<TrackedRegistration>, StateStoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_types::{ClusterShape, RegistrationStatus, Tags};

    fn tracked(name: &str) -> TrackedRegistration {
        TrackedRegistration::new(
            RegistrationHandle::new(name),
            None,
            RegistrationRecord {
                name: name.into(),
                arn: None,
                status: RegistrationStatus::Active,
                connector_config: None,
                tags: Tags::new(),
                created_at: None,
                shape: ClusterShape::default(),
                health: None,
            },
        )
    }

    #[tokio::test]
    async fn test_in_memory_save_get_remove() {
        let store = InMemoryRegistrationStateStore::new();
        store.save(&tracked("b")).await.unwrap();
        store.save(&tracked("a")).await.unwrap();

        let listed: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.handle.to_string())
            .collect();
        assert_eq!(listed, vec!["a", "b"]);

        assert!(store.remove(&RegistrationHandle::new("a")).await.unwrap());
        assert!(!store.remove(&RegistrationHandle::new("a")).await.unwrap());
        assert!(store.get(&RegistrationHandle::new("a")).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("registrations.json");

        let store = JsonFileStateStore::new(&path);
        assert!(store.list().await.unwrap().is_empty());
        store.save(&tracked("edge")).await.unwrap();

        let reopened = JsonFileStateStore::new(&path);
        let loaded = reopened
            .get(&RegistrationHandle::new("edge"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.record.status, RegistrationStatus::Active);

        assert!(reopened.remove(&RegistrationHandle::new("edge")).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_file_store_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registrations.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = JsonFileStateStore::new(&path).list().await.unwrap_err();
        assert!(matches!(err, StateStoreError::Corrupt { .. }));
    }
}
