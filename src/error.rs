//! Error taxonomy shared by services, checks and the controller

use crate::query::EvalError;

/// Errors raised by the execution core
#[derive(Debug, Clone, thiserror::Error)]
pub enum EyeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Timeout after {0} ms")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvalError),

    #[error("Service '{0}' is closed")]
    Closed(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl EyeError {
    /// Misuse or configuration errors that must reach the caller instead of
    /// being folded into a failing verdict.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EyeError::NotFound(_)
                | EyeError::InvalidRequest(_)
                | EyeError::InvalidParams(_)
                | EyeError::Closed(_)
        )
    }
}

impl From<std::io::Error> for EyeError {
    fn from(e: std::io::Error) -> Self {
        EyeError::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for EyeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EyeError::Backend(format!("request timed out: {}", e))
        } else if e.is_connect() {
            EyeError::Connection(e.to_string())
        } else {
            EyeError::Backend(e.to_string())
        }
    }
}
