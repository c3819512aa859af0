//! Runs source snippets in a fresh interpreter process.

use std::io::{ErrorKind, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::process::{self, RunStatus};
use super::result::{ExecutionResult, ExecutorError, EXIT_CODE_SENTINEL};
use crate::metrics;

/// Default snippet timeout.
pub const DEFAULT_SNIPPET_TIMEOUT: Duration = Duration::from_secs(10);

/// Interpreter invocation: `program args... <snippet file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpreter {
    pub program: String,
    pub args: Vec<String>,
    /// Extension of the temporary snippet file, without the dot.
    pub extension: String,
}

impl Interpreter {
    pub fn new(program: impl Into<String>, args: Vec<String>, extension: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extension: extension.into(),
        }
    }

    /// `python3 -I -u`: isolated mode ignores user site-packages and
    /// `PYTHON*` variables, unbuffered output survives a kill.
    pub fn python() -> Self {
        Self::new("python3", vec!["-I".to_string(), "-u".to_string()], "py")
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::python()
    }
}

/// Executes snippets, one fresh process per run.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    interpreter: Interpreter,
    default_timeout: Duration,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(Interpreter::python())
    }
}

impl ExecutionEngine {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            default_timeout: DEFAULT_SNIPPET_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs `code` with the engine's default timeout.
    pub async fn run_default(&self, code: &str, stdin: Option<&str>) -> ExecutionResult {
        self.run(code, stdin, self.default_timeout).await
    }

    /// Runs `code` once, feeding it `stdin`, and waits at most `timeout`.
    ///
    /// Never returns an error: spawn failures and timeouts are reported in
    /// the result. The temporary snippet file is removed on every path.
    pub async fn run(&self, code: &str, stdin: Option<&str>, timeout: Duration) -> ExecutionResult {
        let start = Instant::now();

        let script = match write_snippet(code, &self.interpreter.extension) {
            Ok(path) => path,
            Err(e) => {
                let result = ExecutionResult::executor_failure(ExecutorError::Setup(e.to_string()), start.elapsed());
                metrics::record_snippet_run(&result);
                return result;
            }
        };
        debug!("Wrote snippet to {}", script.display());

        let mut command = Command::new(&self.interpreter.program);
        command.args(&self.interpreter.args).arg(&*script);

        let result = match process::run_captured(command, stdin.map(str::to_owned), timeout).await {
            Ok(run) => match run.status {
                RunStatus::Exited(code) => ExecutionResult::completed(
                    code.unwrap_or(EXIT_CODE_SENTINEL),
                    run.stdout,
                    run.stderr,
                    run.duration,
                ),
                RunStatus::TimedOut => {
                    ExecutionResult::timed_out(timeout, run.stdout, run.stderr, run.duration)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => ExecutionResult::executor_failure(
                ExecutorError::InterpreterNotFound {
                    program: self.interpreter.program.clone(),
                },
                start.elapsed(),
            ),
            Err(e) => ExecutionResult::executor_failure(ExecutorError::Spawn(e.to_string()), start.elapsed()),
        };

        if let Err(e) = script.close() {
            warn!("Failed to remove snippet file: {}", e);
        }

        info!(
            "Snippet finished: outcome={} exit_code={} duration={:?}",
            result.outcome(),
            result.exit_code,
            result.duration
        );
        metrics::record_snippet_run(&result);
        result
    }
}

fn write_snippet(code: &str, extension: &str) -> std::io::Result<TempPath> {
    let suffix = if extension.is_empty() {
        String::new()
    } else {
        format!(".{extension}")
    };
    let mut file = tempfile::Builder::new()
        .prefix("snippet_")
        .suffix(&suffix)
        .tempfile()?;
    file.write_all(code.as_bytes())?;
    file.flush()?;
    Ok(file.into_temp_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_defaults() {
        let engine = ExecutionEngine::default();
        assert_eq!(engine.interpreter().program, "python3");
        assert_eq!(engine.interpreter().args, vec!["-I", "-u"]);
        assert_eq!(engine.default_timeout(), DEFAULT_SNIPPET_TIMEOUT);
    }

    #[test]
    fn test_write_snippet_suffix() {
        let path = write_snippet("print(1)\n", "py").unwrap();
        assert!(path.to_string_lossy().ends_with(".py"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print(1)\n");
        let kept = path.to_path_buf();
        drop(path);
        assert!(!kept.exists());
    }
}
