//! Tether Lifecycle - Cluster registration lifecycle controller
//!
//! Drives an externally-created cluster through registration with a remote
//! control-plane service:
//! - [`PropagationRetry`]: Register, retried while a referenced role has not
//!   propagated yet
//! - [`StabilityWaiter`]: polls Describe until the registration settles
//! - [`ReconcilingReader`]: interprets NotFound depending on context
//! - [`RegistrationController`]: create / read / delete / import, with tracked
//!   state kept in a [`RegistrationStateStore`]
//!
//! Every operation takes a [`CancellationToken`]; cancelling it stops retries
//! and polling at the next suspension point.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod cancel;

pub mod builder;
pub mod config;
pub mod controller;
pub mod error;
pub mod reader;
pub mod retry;
pub mod state;
pub mod tags;
pub mod waiter;

pub use builder::RegistrationControllerBuilder;
pub use config::{LifecycleConfig, PollConfig, MAX_CREATE_TIMEOUT, MIN_POLL_FLOOR};
pub use controller::{OperationResult, RegistrationController};
pub use error::{ErrorKind, LifecycleError, Operation, OperationError, Result};
pub use reader::{ReadMode, ReadOutcome, ReconcilingReader};
pub use retry::{
    PropagationRetry, PROPAGATION_INITIAL_DELAY, PROPAGATION_MAX_DELAY, PROPAGATION_TIMEOUT,
};
pub use state::{
    InMemoryRegistrationStateStore, JsonFileStateStore, RegistrationStateStore, StateStoreError,
    TrackedRegistration,
};
pub use tags::{DefaultTags, PassthroughTags, TagTransform};
pub use waiter::{StabilityWaiter, StatusClass, StatusPolicy};
