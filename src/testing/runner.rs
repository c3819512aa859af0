//! Runs an external test tool against a staged test file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use super::result::{TestExecutionError, TestRunResult};
use crate::execution::process::{self, CapturedRun, RunStatus};
use crate::execution::EXIT_CODE_SENTINEL;
use crate::metrics;
use crate::workspace::fs_ops;

/// Default test run timeout.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How to invoke the test tool and read its exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunnerConfig {
    pub program: String,
    /// Arguments placed before the test file path.
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Exit codes meaning "tests ran and some failed".
    pub failure_exit_codes: Vec<i32>,
    /// Environment variable holding the import search path.
    pub search_path_var: String,
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self::pytest()
    }
}

impl TestRunnerConfig {
    /// `python3 -m pytest -q <file>`, where exit code 1 means failed tests.
    pub fn pytest() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "pytest".to_string(), "-q".to_string()],
            timeout: DEFAULT_TEST_TIMEOUT,
            failure_exit_codes: vec![1],
            search_path_var: "PYTHONPATH".to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_exit_codes(mut self, codes: Vec<i32>) -> Self {
        self.failure_exit_codes = codes;
        self
    }
}

/// Runs staged tests with the staging root on the import path.
#[derive(Debug, Clone, Default)]
pub struct TestRunner {
    config: TestRunnerConfig,
}

impl TestRunner {
    pub fn new(config: TestRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestRunnerConfig {
        &self.config
    }

    /// Runs the test tool on `staged_test_path` from inside `staging_root`.
    ///
    /// The staging root is prepended to the search path variable so the
    /// staged test imports the staged module by its final package path.
    pub async fn run_tests(&self, staged_test_path: &Path, staging_root: &Path) -> TestRunResult {
        let staged_test_path = fs_ops::absolutize(staged_test_path);
        let staging_root = fs_ops::absolutize(staging_root);

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .arg(&staged_test_path)
            .current_dir(&staging_root)
            .env(
                &self.config.search_path_var,
                search_path(&staging_root, std::env::var_os(&self.config.search_path_var)),
            );

        info!(
            "Running tests: {} {} {}",
            self.config.program,
            self.config.args.join(" "),
            staged_test_path.display()
        );

        let result = match process::run_captured(command, None, self.config.timeout).await {
            Ok(run) => self.classify(run),
            Err(e) => TestRunResult::tool_error(
                TestExecutionError::Launch {
                    program: self.config.program.clone(),
                    reason: e.to_string(),
                },
                String::new(),
                Duration::ZERO,
            ),
        };

        if result.passed {
            info!("Tests passed in {:?}", result.duration);
        } else {
            warn!("Tests did not pass: {}", result.outcome.label());
        }
        metrics::record_test_run(&result);
        result
    }

    fn classify(&self, run: CapturedRun) -> TestRunResult {
        let output = combine_output(&run.stdout, &run.stderr);
        match run.status {
            RunStatus::Exited(Some(0)) => TestRunResult::passed(output, run.duration),
            RunStatus::Exited(Some(code)) if self.config.failure_exit_codes.contains(&code) => {
                TestRunResult::tests_failed(code, output, run.duration)
            }
            RunStatus::Exited(code) => TestRunResult::tool_error(
                TestExecutionError::ToolFailed {
                    exit_code: code.unwrap_or(EXIT_CODE_SENTINEL),
                },
                output,
                run.duration,
            ),
            RunStatus::TimedOut => TestRunResult::tool_error(
                TestExecutionError::TimedOut(self.config.timeout),
                output,
                run.duration,
            ),
        }
    }
}

fn search_path(staging_root: &Path, existing: Option<OsString>) -> OsString {
    let mut entries: Vec<PathBuf> = vec![staging_root.to_path_buf()];
    if let Some(existing) = existing {
        entries.extend(std::env::split_paths(&existing).filter(|p| !p.as_os_str().is_empty()));
    }
    std::env::join_paths(&entries).unwrap_or_else(|_| staging_root.as_os_str().to_owned())
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (_, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) if stdout.ends_with('\n') => format!("{stdout}{stderr}"),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_path_prepends_staging() {
        let joined = search_path(Path::new("/stage"), Some(OsString::from("/a:/b")));
        let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(
            parts,
            vec![PathBuf::from("/stage"), PathBuf::from("/a"), PathBuf::from("/b")]
        );
        assert_eq!(search_path(Path::new("/stage"), None), OsString::from("/stage"));
    }

    #[test]
    fn test_combine_output() {
        assert_eq!(combine_output("out\n", "err"), "out\nerr");
        assert_eq!(combine_output("out", "err"), "out\nerr");
        assert_eq!(combine_output("", "err"), "err");
        assert_eq!(combine_output("out", ""), "out");
    }

    #[test]
    fn test_classify_exit_bands() {
        let runner = TestRunner::default();
        let run = |status| CapturedRun {
            status,
            stdout: "report".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(5),
        };

        assert!(runner.classify(run(RunStatus::Exited(Some(0)))).passed);

        let failed = runner.classify(run(RunStatus::Exited(Some(1))));
        assert!(!failed.passed && !failed.is_tool_error());
        assert_eq!(failed.output, "report");

        let crashed = runner.classify(run(RunStatus::Exited(Some(2))));
        assert_eq!(
            crashed.error(),
            Some(&TestExecutionError::ToolFailed { exit_code: 2 })
        );
        assert!(crashed.output.ends_with("report"));

        let timed_out = runner.classify(run(RunStatus::TimedOut));
        assert_eq!(
            timed_out.error(),
            Some(&TestExecutionError::TimedOut(DEFAULT_TEST_TIMEOUT))
        );
    }
}
