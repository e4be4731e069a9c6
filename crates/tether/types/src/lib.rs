//! Tether Types - Core type definitions for cluster registration
//!
//! This crate provides the data model shared by the backend client, the
//! lifecycle controller and the CLI:
//! - Identifiers (registration names, backend handles, request tokens)
//! - Registration requests built from operator configuration
//! - Registration records as reported by the control-plane service
//! - Registration status vocabulary

pub mod ids;
pub mod registration;
pub mod status;

pub use ids::{ClientRequestToken, RegistrationHandle, RegistrationName};
pub use registration::{
    CertificateAuthority, ClusterHealth, ClusterIssue, ClusterShape, ConnectorConfigRequest,
    ConnectorConfigResponse, ConnectorProvider, ParseProviderError, RegistrationRecord,
    RegistrationRequest, Tags,
};
pub use status::RegistrationStatus;
