//! Unified error types for twocap

use std::time::Duration;
use thiserror::Error;

/// Unified error type for all twocap operations
#[derive(Error, Debug)]
pub enum CaptchaError {
    // Protocol errors
    #[error("Remote rejection during {operation}: {code}")]
    RemoteRejection {
        operation: &'static str,
        code: String,
    },

    #[error(
        "The execution time exceeded a maximum time of {} seconds",
        .max_wait.as_secs_f64()
    )]
    Timeout { max_wait: Duration },

    #[error("Job {task_id} already finished in state {state}")]
    JobFinished { task_id: String, state: String },

    #[error("Invalid task: {0}")]
    InvalidTask(String),

    // Status page errors
    #[error("2captcha service unavailable: {0}")]
    ServiceUnavailable(String),

    // Delivery errors
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptchaError {
    /// Protocol-level error code, when the server supplied one
    pub fn remote_code(&self) -> Option<&str> {
        match self {
            CaptchaError::RemoteRejection { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Result type alias using CaptchaError
pub type Result<T> = std::result::Result<T, CaptchaError>;
