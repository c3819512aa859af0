//! Test runner for staged test artifacts.
//!
//! The test tool's exit code decides the verdict: 0 passes, a configured
//! failure code means the tests ran and failed, anything else (or a
//! timeout, or a launch failure) is a tool-level error.

pub mod result;
pub mod runner;

pub use result::{TestExecutionError, TestOutcome, TestRunResult};
pub use runner::{TestRunner, TestRunnerConfig, DEFAULT_TEST_TIMEOUT};
