//! Registration requests and records
//!
//! A [`RegistrationRequest`] is built once from operator configuration. A
//! [`RegistrationRecord`] is what the backend reports back from Describe; the
//! controller only ever observes records, it never edits them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ids::RegistrationName;
use crate::status::RegistrationStatus;

/// Resource tags, ordered for stable output.
pub type Tags = BTreeMap<String, String>;

/// Platform the externally-created cluster runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorProvider {
    EksAnywhere,
    Anthos,
    Gke,
    Aks,
    Openshift,
    Tanzu,
    Rancher,
    Ec2,
    Other,
}

impl ConnectorProvider {
    pub const ALL: [ConnectorProvider; 9] = [
        ConnectorProvider::EksAnywhere,
        ConnectorProvider::Anthos,
        ConnectorProvider::Gke,
        ConnectorProvider::Aks,
        ConnectorProvider::Openshift,
        ConnectorProvider::Tanzu,
        ConnectorProvider::Rancher,
        ConnectorProvider::Ec2,
        ConnectorProvider::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorProvider::EksAnywhere => "EKS_ANYWHERE",
            ConnectorProvider::Anthos => "ANTHOS",
            ConnectorProvider::Gke => "GKE",
            ConnectorProvider::Aks => "AKS",
            ConnectorProvider::Openshift => "OPENSHIFT",
            ConnectorProvider::Tanzu => "TANZU",
            ConnectorProvider::Rancher => "RANCHER",
            ConnectorProvider::Ec2 => "EC2",
            ConnectorProvider::Other => "OTHER",
        }
    }
}

impl fmt::Display for ConnectorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown connector provider: {0}")]
pub struct ParseProviderError(pub String);

impl FromStr for ConnectorProvider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ConnectorProvider::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ParseProviderError(s.to_string()))
    }
}

/// Connector settings sent with Register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfigRequest {
    /// Platform of the external cluster.
    pub provider: ConnectorProvider,

    /// Role the connector agent assumes (ARN).
    pub role_arn: String,
}

/// Everything needed to register one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Immutable, caller-assigned name.
    pub name: RegistrationName,

    /// Connector settings.
    pub connector_config: ConnectorConfigRequest,

    /// Tags to attach to the registration.
    #[serde(default)]
    pub tags: Tags,
}

impl RegistrationRequest {
    /// Create a request without tags.
    pub fn new(
        name: impl Into<RegistrationName>,
        provider: ConnectorProvider,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connector_config: ConnectorConfigRequest {
                provider,
                role_arn: role_arn.into(),
            },
            tags: Tags::new(),
        }
    }

    /// Add a tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Role the request references.
    pub fn role_arn(&self) -> &str {
        &self.connector_config.role_arn
    }
}

/// Connector settings as reported by Describe.
///
/// The activation code is handed out once and is needed to install the
/// connector agent in the external cluster before it expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfigResponse {
    pub provider: ConnectorProvider,
    pub role_arn: String,
    pub activation_id: Option<String>,
    pub activation_code: Option<String>,
    pub activation_expiry: Option<DateTime<Utc>>,
}

/// Certificate authority data of the cluster endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub data: Option<String>,
}

/// Read-only cluster attributes passed through from the backend untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterShape {
    pub endpoint: Option<String>,
    pub certificate_authority: Option<CertificateAuthority>,
    pub platform_version: Option<String>,
    pub role_arn: Option<String>,
    pub oidc_issuer: Option<String>,
    pub service_ipv4_cidr: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub cluster_security_group_id: Option<String>,
    pub endpoint_private_access: bool,
    pub endpoint_public_access: bool,
    pub public_access_cidrs: Vec<String>,
    pub enabled_cluster_log_types: Vec<String>,
    pub encryption_key_arns: Vec<String>,
}

/// A single problem reported by the backend for a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIssue {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub resource_ids: Vec<String>,
}

/// Health block of a registration record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealth {
    #[serde(default)]
    pub issues: Vec<ClusterIssue>,
}

impl ClusterHealth {
    /// Human-readable summary of the reported issues, if any.
    pub fn summary(&self) -> Option<String> {
        if self.issues.is_empty() {
            return None;
        }

        Some(
            self.issues
                .iter()
                .map(|issue| format!("{}: {}", issue.code, issue.message))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// A registration as reported by Describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub name: RegistrationName,
    pub arn: Option<String>,
    pub status: RegistrationStatus,
    pub connector_config: Option<ConnectorConfigResponse>,
    #[serde(default)]
    pub tags: Tags,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub shape: ClusterShape,
    pub health: Option<ClusterHealth>,
}

impl RegistrationRecord {
    /// Provider reported for the registration.
    pub fn provider(&self) -> Option<ConnectorProvider> {
        self.connector_config.as_ref().map(|c| c.provider)
    }

    /// Role reference reported for the registration.
    pub fn role_arn(&self) -> Option<&str> {
        self.connector_config.as_ref().map(|c| c.role_arn.as_str())
    }

    /// Backend-supplied detail explaining the current status, if any.
    pub fn failure_detail(&self) -> Option<String> {
        self.health.as_ref().and_then(ClusterHealth::summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing_is_lenient_on_case() {
        assert_eq!(
            "eks-anywhere".parse::<ConnectorProvider>().unwrap(),
            ConnectorProvider::EksAnywhere
        );
        assert_eq!("GKE".parse::<ConnectorProvider>().unwrap(), ConnectorProvider::Gke);
        assert!("mainframe".parse::<ConnectorProvider>().is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = RegistrationRequest::new(
            "edge",
            ConnectorProvider::Other,
            "arn:aws:iam::123456789012:role/connector",
        )
        .with_tag("team", "platform");

        assert_eq!(request.name.as_str(), "edge");
        assert_eq!(request.role_arn(), "arn:aws:iam::123456789012:role/connector");
        assert_eq!(request.tags.get("team").map(String::as_str), Some("platform"));
    }

    #[test]
    fn test_failure_detail_from_health() {
        let record = RegistrationRecord {
            name: "edge".into(),
            arn: None,
            status: RegistrationStatus::Failed,
            connector_config: None,
            tags: Tags::new(),
            created_at: None,
            shape: ClusterShape::default(),
            health: Some(ClusterHealth {
                issues: vec![ClusterIssue {
                    code: "AccessDenied".into(),
                    message: "role cannot be assumed".into(),
                    resource_ids: vec![],
                }],
            }),
        };

        assert_eq!(
            record.failure_detail().as_deref(),
            Some("AccessDenied: role cannot be assumed")
        );
    }

    #[test]
    fn test_record_without_shape_deserializes() {
        let json = r#"{
            "name": "edge",
            "arn": null,
            "status": "PENDING",
            "connector_config": null,
            "created_at": null,
            "health": null
        }"#;
        let record: RegistrationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, RegistrationStatus::Pending);
        assert_eq!(record.shape, ClusterShape::default());
    }
}
