//! Strongly-typed identifiers for registration entities
//!
//! Names are chosen by the caller, handles are assigned by the backend and
//! request tokens are minted once per create operation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Caller-assigned name of a cluster registration.
///
/// Unique per backend account and region. Changing it means destroying the
/// registration and creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationName(String);

impl RegistrationName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistrationName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for RegistrationName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Backend-assigned identity of a registration.
///
/// Opaque: it happens to equal the name on current backends, but nothing in
/// the controller relies on that.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationHandle(String);

impl RegistrationHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name to use in diagnostics for operations addressed by handle.
    pub fn display_name(&self) -> RegistrationName {
        RegistrationName::new(self.0.clone())
    }
}

impl fmt::Display for RegistrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Idempotency token sent with every Register attempt of one create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientRequestToken(Uuid);

impl ClientRequestToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClientRequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_generation() {
        let t1 = ClientRequestToken::generate();
        let t2 = ClientRequestToken::generate();
        assert_ne!(t1, t2);
        assert!(t1.to_string().starts_with("token:"));
    }

    #[test]
    fn test_name_serializes_as_plain_string() {
        let name = RegistrationName::new("edge-cluster");
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"edge-cluster\"");
        assert_eq!(name.to_string(), "edge-cluster");
    }

    #[test]
    fn test_handle_display_name() {
        let handle = RegistrationHandle::new("edge-cluster");
        assert_eq!(handle.display_name(), RegistrationName::new("edge-cluster"));
    }
}
