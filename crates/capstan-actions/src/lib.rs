//! Capstan Actions
//!
//! The provisioning steps the orchestrator schedules, and the machinery
//! around them. An [`Action`] is planned off a deployment (validating the
//! fields it needs and snapshotting them) and later run against the
//! provider adapters; re-running after a partial failure must be safe.
//!
//! [`ActionKind`] is the closed set of actions the engine plans, in
//! dependency order. The [`testing`] module ships action doubles and mock
//! provider sets for downstream tests.

pub mod action;
pub mod actions;
pub mod context;
pub mod error;
pub mod kind;
pub mod testing;

pub use action::{Action, Outcome};
pub use actions::{
    AttachRhevStorage, ConfigureOvercloud, ControllerCleanup, LaunchOpenshiftNodes,
    RegisterCloudProvider, SetupRhevEngine,
};
pub use context::{ActionContext, CollectingReporter, NoopReporter, ProgressReporter, ProviderSet};
pub use error::{ActionError, Result};
pub use kind::{ActionKind, PlannedAction};
