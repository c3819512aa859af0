//! Isolated snippet execution.
//!
//! Each run writes the snippet to a temporary file, spawns a fresh
//! interpreter process on it with piped stdio and a hard timeout, and
//! reports the captured output. The `process` helper is shared with the
//! test runner.
//!
//! ```ignore
//! use selfmod::execution::{ExecutionEngine, Interpreter};
//! use std::time::Duration;
//!
//! let engine = ExecutionEngine::new(Interpreter::python());
//! let result = engine.run("print(input())", Some("hi\n"), Duration::from_secs(5)).await;
//! assert_eq!(result.stdout, "hi\n");
//! ```

pub mod engine;
pub(crate) mod process;
pub mod result;

pub use engine::{ExecutionEngine, Interpreter, DEFAULT_SNIPPET_TIMEOUT};
pub use result::{ExecutionResult, ExecutorError, EXIT_CODE_SENTINEL};
