//! Outcome of a test tool run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The test tool could not produce a verdict.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestExecutionError {
    /// The tool ran but exited outside the passed/failed bands.
    #[error("Test tool exited with code {exit_code}")]
    ToolFailed { exit_code: i32 },

    #[error("Test run timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Failed to launch test tool '{program}': {reason}")]
    Launch { program: String, reason: String },
}

/// Verdict of a test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    /// Tests ran and at least one failed.
    TestsFailed { exit_code: i32 },
    /// The tool itself failed.
    Error { error: TestExecutionError },
}

impl TestOutcome {
    /// Label used for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TestOutcome::Passed => "passed",
            TestOutcome::TestsFailed { .. } => "tests_failed",
            TestOutcome::Error {
                error: TestExecutionError::TimedOut(_),
            } => "timeout",
            TestOutcome::Error { .. } => "tool_error",
        }
    }
}

/// Result of running the test tool against one staged test artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub passed: bool,
    /// Combined stdout and stderr. Tool-level failures are prefixed with a
    /// line naming the failure.
    pub output: String,
    pub outcome: TestOutcome,
    pub duration: Duration,
}

impl TestRunResult {
    pub fn passed(output: String, duration: Duration) -> Self {
        Self {
            passed: true,
            output,
            outcome: TestOutcome::Passed,
            duration,
        }
    }

    /// Tests ran and some failed; output is kept verbatim.
    pub fn tests_failed(exit_code: i32, output: String, duration: Duration) -> Self {
        Self {
            passed: false,
            output,
            outcome: TestOutcome::TestsFailed { exit_code },
            duration,
        }
    }

    /// The tool could not produce a verdict.
    pub fn tool_error(error: TestExecutionError, output: String, duration: Duration) -> Self {
        let header = format!("[test tool error] {error}");
        let output = if output.is_empty() {
            header
        } else {
            format!("{header}\n{output}")
        };
        Self {
            passed: false,
            output,
            outcome: TestOutcome::Error { error },
            duration,
        }
    }

    /// The tool failed rather than the tests.
    pub fn is_tool_error(&self) -> bool {
        matches!(self.outcome, TestOutcome::Error { .. })
    }

    pub fn error(&self) -> Option<&TestExecutionError> {
        match &self.outcome {
            TestOutcome::Error { error } => Some(error),
            _ => None,
        }
    }
}
