use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body returned for API errors.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("deployment 42".to_string());
        assert_eq!(err.to_string(), "Not found: deployment 42");

        let err = Error::Conflict("task already running".to_string());
        assert_eq!(err.to_string(), "Conflict: task already running");
    }

    #[test]
    fn test_error_response_serializes() {
        let body = ErrorResponse::new("not_found", "no such deployment");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["message"], "no such deployment");
    }
}
