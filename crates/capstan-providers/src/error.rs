//! Error types for provider operations

use thiserror::Error;

/// Error type for provider operations.
///
/// Variants are split along the retry boundary: connection failures, timeouts
/// and 5xx-class responses are transient and worth retrying with backoff;
/// authentication failures, rejected requests and provider-side conflicts are
/// permanent and terminate the task.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Could not reach the provider at all
    #[error("connection failed: {0}")]
    Connection(String),

    /// The provider did not answer in time
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The provider answered but is unhealthy (5xx, throttled)
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Credentials were rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The provider rejected the request as malformed or not allowed
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The resource already exists or is in a conflicting state
    #[error("resource conflict: {0}")]
    Conflict(String),

    /// The provider answered with something we could not interpret
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ProviderError {
    /// Whether a bounded retry with backoff may help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Connection(_) | ProviderError::Timeout(_) | ProviderError::Unavailable(_)
        )
    }

    /// Classify an HTTP status code into the transient/permanent taxonomy.
    pub fn from_status(status: reqwest::StatusCode, context: impl Into<String>) -> Self {
        let context = context.into();
        let detail = format!("{} ({})", context, status);
        match status.as_u16() {
            401 | 403 => ProviderError::AuthenticationFailed(detail),
            409 => ProviderError::Conflict(detail),
            429 => ProviderError::Unavailable(detail),
            400..=499 => ProviderError::Rejected(detail),
            500..=599 => ProviderError::Unavailable(detail),
            _ => ProviderError::UnexpectedResponse(detail),
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_request(err: reqwest::Error, context: impl Into<String>) -> Self {
        let detail = format!("{}: {}", context.into(), err);
        if err.is_timeout() {
            ProviderError::Timeout(detail)
        } else if err.is_connect() {
            ProviderError::Connection(detail)
        } else {
            ProviderError::UnexpectedResponse(detail)
        }
    }
}

/// Result type for provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Connection("host unreachable".to_string());
        assert_eq!(err.to_string(), "connection failed: host unreachable");

        let err = ProviderError::AuthenticationFailed("bad credentials".to_string());
        assert_eq!(err.to_string(), "authentication failed: bad credentials");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::Connection("x".into()).is_transient());
        assert!(ProviderError::Timeout("x".into()).is_transient());
        assert!(ProviderError::Unavailable("x".into()).is_transient());

        assert!(!ProviderError::AuthenticationFailed("x".into()).is_transient());
        assert!(!ProviderError::Rejected("x".into()).is_transient());
        assert!(!ProviderError::Conflict("x".into()).is_transient());
        assert!(!ProviderError::UnexpectedResponse("x".into()).is_transient());
    }

    #[test]
    fn test_from_status() {
        let cases = [
            (401, false),
            (403, false),
            (404, false),
            (409, false),
            (429, true),
            (500, true),
            (503, true),
        ];
        for (code, transient) in cases {
            let status = reqwest::StatusCode::from_u16(code).unwrap();
            let err = ProviderError::from_status(status, "GET /test");
            assert_eq!(err.is_transient(), transient, "status {}", code);
        }
    }

    #[test]
    fn test_conflict_from_409() {
        let status = reqwest::StatusCode::from_u16(409).unwrap();
        let err = ProviderError::from_status(status, "create tenant");
        assert!(matches!(err, ProviderError::Conflict(_)));
    }
}
