//! Outcome of a snippet execution.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code reported when the process never produced one.
pub const EXIT_CODE_SENTINEL: i32 = -1;

/// Failures of the executor itself, as opposed to the snippet failing.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorError {
    #[error("Execution timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Interpreter '{program}' not found")]
    InterpreterNotFound { program: String },

    #[error("Failed to spawn interpreter: {0}")]
    Spawn(String),

    #[error("Failed to prepare snippet file: {0}")]
    Setup(String),
}

/// Captured result of one snippet run.
///
/// `success` holds only when the executor did not fail and the process
/// exited with code 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub error: Option<ExecutorError>,
}

impl ExecutionResult {
    /// The process ran to completion.
    pub fn completed(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code,
            duration,
            error: None,
        }
    }

    /// The process was killed at the timeout. Output read so far is kept.
    pub fn timed_out(timeout: Duration, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            exit_code: EXIT_CODE_SENTINEL,
            duration,
            error: Some(ExecutorError::TimedOut(timeout)),
        }
    }

    /// The process could not be started.
    pub fn executor_failure(error: ExecutorError, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: EXIT_CODE_SENTINEL,
            duration,
            error: Some(error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(ExecutorError::TimedOut(_)))
    }

    /// Label used for logging and metrics.
    pub fn outcome(&self) -> &'static str {
        match (&self.error, self.success) {
            (Some(ExecutorError::TimedOut(_)), _) => "timeout",
            (Some(_), _) => "executor_error",
            (None, true) => "success",
            (None, false) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonzero_exit_is_not_success() {
        let result = ExecutionResult::completed(2, String::new(), "boom".into(), Duration::ZERO);
        assert!(!result.success);
        assert!(result.error.is_none());
        assert_eq!(result.outcome(), "failure");
    }

    #[test]
    fn test_timeout_uses_sentinel() {
        let result = ExecutionResult::timed_out(
            Duration::from_secs(1),
            "partial".into(),
            String::new(),
            Duration::from_secs(1),
        );
        assert!(!result.success);
        assert!(result.is_timeout());
        assert_eq!(result.exit_code, EXIT_CODE_SENTINEL);
        assert_eq!(result.stdout, "partial");
    }

    #[test]
    fn test_executor_failure_display() {
        let err = ExecutorError::InterpreterNotFound {
            program: "python9".into(),
        };
        assert_eq!(err.to_string(), "Interpreter 'python9' not found");
        let result = ExecutionResult::executor_failure(err, Duration::ZERO);
        assert_eq!(result.outcome(), "executor_error");
        assert!(result.stdout.is_empty() && result.stderr.is_empty());
    }
}
