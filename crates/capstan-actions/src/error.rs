use capstan_common::ValidationErrors;
use capstan_providers::ProviderError;
use thiserror::Error;

/// Errors surfaced by planning or running an action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The deployment is missing fields the action needs. Raised at plan
    /// time, never retried.
    #[error("invalid input: {0}")]
    InvalidInput(ValidationErrors),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The provider accepted our calls but the work itself failed, e.g. a
    /// remote command exited non-zero.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ActionError {
    /// Whether a retry could plausibly change the outcome. Drives the
    /// runner's bounded retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ActionError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<ValidationErrors> for ActionError {
    fn from(errors: ValidationErrors) -> Self {
        ActionError::InvalidInput(errors)
    }
}

pub type Result<T> = std::result::Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient = ActionError::Provider(ProviderError::Timeout("slow".to_string()));
        assert!(transient.is_transient());

        let permanent = ActionError::Provider(ProviderError::Rejected("bad".to_string()));
        assert!(!permanent.is_transient());

        let failed = ActionError::ExecutionFailed("exit 1".to_string());
        assert!(!failed.is_transient());
    }

    #[test]
    fn test_display_includes_field_errors() {
        let mut errors = ValidationErrors::new();
        errors.add("openstack.overcloud_address", "can't be blank");
        let e = ActionError::InvalidInput(errors);
        assert!(e.to_string().contains("overcloud_address"));
    }
}
