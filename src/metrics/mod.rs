//! Prometheus metrics for self-modification runs.
//!
//! ```ignore
//! use selfmod::metrics::{init_metrics, export_metrics};
//!
//! init_metrics()?;
//! // ... run updates and snippets ...
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{record_phase, record_snippet_run, record_test_run, record_update};
pub use prometheus::{
    export_metrics, init_metrics, PHASE_DURATION, REGISTRY, SNIPPET_DURATION, SNIPPET_RUNS_TOTAL,
    TEST_RUNS_TOTAL, UPDATES_TOTAL,
};
