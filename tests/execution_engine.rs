//! Execution engine behaviour against a real interpreter process.
//!
//! Uses `sh` as the interpreter so the tests do not depend on Python.

use std::path::PathBuf;
use std::time::Duration;

use selfmod::execution::{ExecutionEngine, ExecutorError, Interpreter, EXIT_CODE_SENTINEL};

fn sh_engine() -> ExecutionEngine {
    ExecutionEngine::new(Interpreter::new("sh", vec![], "sh"))
}

#[tokio::test]
async fn test_empty_snippet_succeeds() {
    let result = sh_engine().run("", None, Duration::from_secs(5)).await;

    assert!(result.success);
    assert_eq!(result.exit_code, 0);
    assert!(result.stdout.is_empty());
    assert!(result.stderr.is_empty());
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_captures_output_and_exit_code() {
    let result = sh_engine()
        .run("echo out; echo err >&2; exit 3", None, Duration::from_secs(5))
        .await;

    assert!(!result.success);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert!(result.error.is_none());
    assert_eq!(result.outcome(), "failure");
}

#[tokio::test]
async fn test_stdin_is_piped() {
    let result = sh_engine()
        .run("read name; echo \"Hello, $name!\"", Some("World\n"), Duration::from_secs(5))
        .await;

    assert!(result.success, "stderr: {}", result.stderr);
    assert_eq!(result.stdout, "Hello, World!\n");
}

#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let result = sh_engine()
        .run("echo before; sleep 5", None, Duration::from_millis(500))
        .await;

    assert!(!result.success);
    assert!(result.is_timeout());
    assert_eq!(result.exit_code, EXIT_CODE_SENTINEL);
    assert_eq!(result.error, Some(ExecutorError::TimedOut(Duration::from_millis(500))));
    assert!(result.stdout.contains("before"), "stdout: {:?}", result.stdout);
    assert!(result.duration < Duration::from_secs(5));
}

#[tokio::test]
async fn test_missing_interpreter() {
    let engine = ExecutionEngine::new(Interpreter::new("selfmod-no-such-interpreter", vec![], "sh"));
    let result = engine.run("echo hi", None, Duration::from_secs(5)).await;

    assert!(!result.success);
    assert_eq!(result.exit_code, EXIT_CODE_SENTINEL);
    assert!(result.stdout.is_empty());
    assert!(matches!(
        result.error,
        Some(ExecutorError::InterpreterNotFound { ref program }) if program == "selfmod-no-such-interpreter"
    ));
    assert_eq!(result.outcome(), "executor_error");
}

#[tokio::test]
async fn test_snippet_file_is_removed() {
    let result = sh_engine().run("echo \"$0\"", None, Duration::from_secs(5)).await;
    assert!(result.success);

    let script = PathBuf::from(result.stdout.trim());
    assert!(script.extension().is_some_and(|ext| ext == "sh"));
    assert!(!script.exists(), "{} was left behind", script.display());
}

#[tokio::test]
async fn test_snippet_file_is_removed_after_timeout() {
    let result = sh_engine()
        .run("echo \"$0\"; sleep 5", None, Duration::from_millis(300))
        .await;
    assert!(result.is_timeout());

    let script = PathBuf::from(result.stdout.trim());
    assert!(!script.as_os_str().is_empty());
    assert!(!script.exists());
}

#[tokio::test]
async fn test_default_timeout_is_used() {
    let engine = sh_engine().with_default_timeout(Duration::from_millis(300));
    let result = engine.run_default("sleep 5", None).await;
    assert!(result.is_timeout());
}
