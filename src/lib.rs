//! selfmod: a self-modification pipeline for a live Python code base.
//!
//! This library runs code snippets in isolated interpreter processes and
//! drives generated updates through extraction, static validation, staging,
//! testing, operator confirmation, backup and apply.

// Core modules
pub mod cli;
pub mod codegen;
pub mod error;
pub mod execution;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod testing;
pub mod utils;
pub mod workspace;

// Re-export commonly used error types
pub use error::{
    ApplyError, BackupError, ExtractionError, InvalidPathError, LlmError, PipelineError,
    StagingError, SyntaxError,
};

pub use execution::{ExecutionEngine, ExecutionResult, Interpreter};
pub use pipeline::{Phase, PipelineConfig, UpdatePipeline, UpdateReport, UpdateRequest};
