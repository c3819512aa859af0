//! Update pipeline for self-modification requests.
//!
//! # Architecture
//!
//! - **Phase**: the request lifecycle as a tagged union of phase and payload
//! - **Orchestrator**: drives a request through generation, validation,
//!   staging, testing, confirmation and apply
//! - **Confirm**: the operator's yes/no gate before anything goes live
//! - **Config**: roots, interpreter, test tool and generation settings
//!
//! # Pipeline Flow
//!
//! 1. **Propose**: a task description and a target path become a request
//! 2. **Generate**: the text generator returns a bundle with a main and a test section
//! 3. **Extract / Validate**: both sections are pulled out and parsed, never executed
//! 4. **Stage / Test**: both files are staged and the staged tests run against the staged module
//! 5. **Confirm / Apply**: after an explicit "yes" the live artifact is backed up and replaced
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use selfmod::pipeline::{ConsoleConfirmation, PipelineConfig, UpdatePipeline};
//!
//! let config = PipelineConfig::from_env()?;
//! let pipeline = UpdatePipeline::new(config, generator, Arc::new(ConsoleConfirmation))?;
//!
//! let report = pipeline.execute("write a function that adds two numbers", None).await?;
//! println!("{}: {}", report.final_phase, report.message);
//! ```

pub mod config;
pub mod confirm;
pub mod orchestrator;
pub mod phase;

// Re-export main types for convenience
pub use config::{ConfigError, PipelineConfig};
pub use confirm::{parse_answer, AutoConfirm, Confirmation, ConsoleConfirmation};
pub use orchestrator::{UpdatePipeline, UpdateReport};
pub use phase::{
    AppliedUpdate, Phase, PhaseFailure, StagedPair, TransitionError, UpdateRequest, UpdateState,
};
