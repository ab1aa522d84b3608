//! Reasoning backend error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while asking a backend to generate content
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Reasoning backend not configured: {0}")]
    NotConfigured(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_carries_status() {
        let err = BackendError::Api {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "API error 503: overloaded");
    }

    #[test]
    fn test_timeout_message_names_the_limit() {
        let err = BackendError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Timeout after 30s");
    }
}
