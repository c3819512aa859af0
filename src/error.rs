//! Error types for selfmod operations.
//!
//! Defines error types for every phase of a self-modification:
//! - Text generation through the LLM collaborator
//! - Extraction and static validation of generated code
//! - Staging, backup and application of artifacts
//! - The pipeline-level taxonomy that phase failures are folded into

use std::path::PathBuf;

use thiserror::Error;

use crate::codegen::CodeSection;
use crate::pipeline::Phase;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication rejected ({code}): {message}")]
    Unauthorized { code: u16, message: String },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// A relative artifact path that cannot be used against a root directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid relative path '{path}': {reason}")]
pub struct InvalidPathError {
    pub path: String,
    pub reason: String,
}

/// Errors that can occur while placing artifacts in the staging area.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Source path '{}' not found", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Staged item '{}' not found", .0.display())]
    NotStaged(PathBuf),

    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),

    #[error("Failed to stage '{}': {source}", .path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while backing up or restoring live artifacts.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),

    #[error("Backup '{}' not found", .0.display())]
    MissingBackup(PathBuf),

    #[error("Failed to copy '{}' into the backup archive: {source}", .path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore '{}': {source}", .path.display())]
    RestoreFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while applying a staged artifact to the live codebase.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    InvalidPath(#[from] InvalidPathError),

    #[error("Staged item '{}' not found", .0.display())]
    StagedNotFound(PathBuf),

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("Failed to copy staged artifact to '{}': {source}", .path.display())]
    CopyFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to replace live artifact '{}': {source}", .path.display())]
    ReplaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Applied artifact '{}' does not match the staged content (expected {expected}, found {actual})", .path.display())]
    DigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while extracting code sections from a generated bundle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Missing begin marker '{marker}' for the {section} section")]
    MissingBeginMarker { section: CodeSection, marker: String },

    #[error("Missing end marker '{marker}' after the begin marker of the {section} section")]
    MissingEndMarker { section: CodeSection, marker: String },

    #[error("The {section} section is empty")]
    EmptySection { section: CodeSection },
}

impl ExtractionError {
    /// Which section the failure belongs to.
    pub fn section(&self) -> CodeSection {
        match self {
            ExtractionError::MissingBeginMarker { section, .. }
            | ExtractionError::MissingEndMarker { section, .. }
            | ExtractionError::EmptySection { section } => *section,
        }
    }
}

/// Static parse failure of a generated code section.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{section} code failed syntax validation at line {line}, column {column}: {detail}")]
pub struct SyntaxError {
    /// Whether the main code or the test code failed.
    pub section: CodeSection,
    /// 1-based line of the first error, 0 when the parser could not run.
    pub line: usize,
    /// 1-based column of the first error.
    pub column: usize,
    /// Parser description of the problem.
    pub detail: String,
}

/// Phase failures of the update pipeline.
///
/// Each variant ends an update request in the `Failed` phase.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Code generation failed: {0}")]
    Generation(String),

    #[error("Code extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    #[error("Staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("Applying the update failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        PipelineError::Generation(err.to_string())
    }
}

impl PipelineError {
    /// Raw diagnostic text attached to the failure, when there is one.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            PipelineError::Generation(detail) => Some(detail.clone()),
            PipelineError::Syntax(err) => Some(err.detail.clone()),
            PipelineError::Extraction(err) => Some(err.to_string()),
            PipelineError::Staging(err) => std::error::Error::source(err).map(|s| s.to_string()),
            PipelineError::Apply(err) => std::error::Error::source(err).map(|s| s.to_string()),
            PipelineError::InvalidTransition { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_converts_verbatim() {
        let err: PipelineError = LlmError::RequestFailed("connection refused".to_string()).into();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert_eq!(
            err.diagnostic().as_deref(),
            Some("HTTP request failed: connection refused")
        );
    }

    #[test]
    fn test_syntax_error_display_names_section() {
        let err = SyntaxError {
            section: CodeSection::Test,
            line: 3,
            column: 7,
            detail: "missing ')'".to_string(),
        };
        let message = err.to_string();
        assert!(message.starts_with("test code"));
        assert!(message.contains("line 3, column 7"));
    }

    #[test]
    fn test_extraction_error_section() {
        let err = ExtractionError::MissingEndMarker {
            section: CodeSection::Main,
            marker: "# END".to_string(),
        };
        assert_eq!(err.section(), CodeSection::Main);
    }
}
