//! Orchestrator-level errors, as the API layer sees them.

use capstan_common::ValidationErrors;
use thiserror::Error;

use crate::plan::PlanError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The deployment already has a pending or running task.
    #[error("deployment already has an active task")]
    Conflict,

    #[error("invalid deployment: {0}")]
    Validation(ValidationErrors),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PlanError> for OrchestratorError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Validation(errors) => OrchestratorError::Validation(errors),
            PlanError::Internal(message) => OrchestratorError::Internal(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
