//! Recording helpers called from the execution engine, test runner and pipeline.

use std::time::Duration;

use super::prometheus::{
    PHASE_DURATION, SNIPPET_DURATION, SNIPPET_RUNS_TOTAL, TEST_RUNS_TOTAL, UPDATES_TOTAL,
};
use crate::execution::ExecutionResult;
use crate::pipeline::Phase;
use crate::testing::TestRunResult;

/// Records one snippet execution.
pub fn record_snippet_run(result: &ExecutionResult) {
    if let Some(counter) = SNIPPET_RUNS_TOTAL.get() {
        counter.with_label_values(&[result.outcome()]).inc();
    }
    if let Some(histogram) = SNIPPET_DURATION.get() {
        histogram.observe(result.duration.as_secs_f64());
    }
}

/// Records one test tool invocation.
pub fn record_test_run(result: &TestRunResult) {
    if let Some(counter) = TEST_RUNS_TOTAL.get() {
        counter.with_label_values(&[result.outcome.label()]).inc();
    }
}

/// Records time spent in a pipeline phase.
pub fn record_phase(phase: Phase, elapsed: Duration) {
    if let Some(histogram) = PHASE_DURATION.get() {
        histogram
            .with_label_values(&[phase.as_str()])
            .observe(elapsed.as_secs_f64());
    }
}

/// Records an update request reaching its terminal phase.
pub fn record_update(final_phase: Phase) {
    if let Some(counter) = UPDATES_TOTAL.get() {
        counter.with_label_values(&[final_phase.as_str()]).inc();
    }
}
