//! Language-model error types

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a LanguageModel backend
#[derive(Debug, Error)]
pub enum LmError {
    #[error("Backend not ready: {0}")]
    NotReady(String),

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl LmError {
    /// Whether a caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            LmError::RateLimited { .. } => true,
            LmError::Api { status, .. } => *status >= 500,
            LmError::Timeout(_) => true,
            LmError::NotReady(_) => false,
            LmError::InvalidResponse(_) => false,
        }
    }
}
