//! Tether Backend - Control-plane service boundary
//!
//! Defines the [`BackendClient`] collaborator the lifecycle controller talks
//! to, the structured [`BackendError`] classification of its failures, and a
//! [`SimulatedBackend`] used by tests and the CLI.

pub mod client;
pub mod error;
pub mod simulated;

pub use client::{BackendClient, RegisterClusterInput};
pub use error::{codes, BackendError, BackendErrorKind, BackendResult, NOT_EXISTING_ROLE};
pub use simulated::{SimulatedBackend, SimulatedOperation, SimulatedRegistration, SimulatedWorld};
