//! Command-line interface for selfmod.
//!
//! Provides commands for snippet execution, the update pipeline, syntax
//! validation, staging and backup management.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
