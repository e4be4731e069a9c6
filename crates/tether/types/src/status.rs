//! Registration status vocabulary
//!
//! The backend owns this vocabulary and may grow it at any time, so unknown
//! values are kept verbatim instead of being rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a registration as reported by Describe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RegistrationStatus {
    /// Backend is still creating the registration.
    Creating,
    /// Registration exists and awaits the connector agent.
    Pending,
    /// Connector agent connected; registration is usable.
    Active,
    /// Registration failed on the backend side.
    Failed,
    /// Registration is being removed.
    Deleting,
    /// Registration is being updated.
    Updating,
    /// A status this client does not know about.
    Unknown(String),
}

impl RegistrationStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &str {
        match self {
            RegistrationStatus::Creating => "CREATING",
            RegistrationStatus::Pending => "PENDING",
            RegistrationStatus::Active => "ACTIVE",
            RegistrationStatus::Failed => "FAILED",
            RegistrationStatus::Deleting => "DELETING",
            RegistrationStatus::Updating => "UPDATING",
            RegistrationStatus::Unknown(raw) => raw,
        }
    }

    /// Whether the status belongs to the known vocabulary.
    pub fn is_known(&self) -> bool {
        !matches!(self, RegistrationStatus::Unknown(_))
    }
}

impl FromStr for RegistrationStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CREATING" => RegistrationStatus::Creating,
            "PENDING" => RegistrationStatus::Pending,
            "ACTIVE" => RegistrationStatus::Active,
            "FAILED" => RegistrationStatus::Failed,
            "DELETING" => RegistrationStatus::Deleting,
            "UPDATING" => RegistrationStatus::Updating,
            other => RegistrationStatus::Unknown(other.to_string()),
        })
    }
}

impl From<String> for RegistrationStatus {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<RegistrationStatus> for String {
    fn from(status: RegistrationStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KNOWN: [&str; 6] = [
        "CREATING", "PENDING", "ACTIVE", "FAILED", "DELETING", "UPDATING",
    ];

    #[test]
    fn test_known_statuses_parse() {
        assert_eq!(
            "ACTIVE".parse::<RegistrationStatus>().unwrap(),
            RegistrationStatus::Active
        );
        assert_eq!(
            "PENDING".parse::<RegistrationStatus>().unwrap(),
            RegistrationStatus::Pending
        );
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let status: RegistrationStatus = serde_json::from_str("\"HIBERNATING\"").unwrap();
        assert_eq!(status, RegistrationStatus::Unknown("HIBERNATING".into()));
        assert!(!status.is_known());
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"HIBERNATING\"");
    }

    proptest! {
        #[test]
        fn prop_display_round_trips(raw in "[A-Z_]{1,16}") {
            let status: RegistrationStatus = raw.parse().unwrap();
            prop_assert_eq!(status.to_string(), raw.clone());
            prop_assert_eq!(status.is_known(), KNOWN.contains(&raw.as_str()));
        }
    }
}
