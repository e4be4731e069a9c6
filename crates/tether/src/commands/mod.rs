//! CLI command implementations

pub mod registration;
