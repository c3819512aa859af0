//! Prometheus metrics registration and export.
//!
//! Metrics live in process-wide statics and are created by [`init_metrics`].
//! Until then every recording helper is a no-op.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global registry for all selfmod metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Update requests that reached a terminal phase, labeled by phase.
pub static UPDATES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Time spent in each pipeline phase, labeled by phase.
pub static PHASE_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Snippet executions, labeled by outcome.
pub static SNIPPET_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Snippet wall-clock duration in seconds.
pub static SNIPPET_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Test runs, labeled by outcome.
pub static TEST_RUNS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Creates every metric and registers it.
///
/// Calling it again after a successful call leaves the first registry in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric cannot be created or registered.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let updates_total = CounterVec::new(
        Opts::new(
            "selfmod_updates_total",
            "Update requests that reached a terminal phase",
        ),
        &["phase"],
    )?;

    let phase_duration = HistogramVec::new(
        HistogramOpts::new(
            "selfmod_phase_duration_seconds",
            "Time spent in each pipeline phase",
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0]),
        &["phase"],
    )?;

    let snippet_runs_total = CounterVec::new(
        Opts::new("selfmod_snippet_runs_total", "Snippet executions"),
        &["outcome"],
    )?;

    let snippet_duration = Histogram::with_opts(
        HistogramOpts::new(
            "selfmod_snippet_duration_seconds",
            "Snippet execution duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )?;

    let test_runs_total = CounterVec::new(
        Opts::new("selfmod_test_runs_total", "Test tool invocations"),
        &["outcome"],
    )?;

    registry.register(Box::new(updates_total.clone()))?;
    registry.register(Box::new(phase_duration.clone()))?;
    registry.register(Box::new(snippet_runs_total.clone()))?;
    registry.register(Box::new(snippet_duration.clone()))?;
    registry.register(Box::new(test_runs_total.clone()))?;

    // Losing a race with another initialiser is fine; its metrics win.
    let _ = REGISTRY.set(registry);
    let _ = UPDATES_TOTAL.set(updates_total);
    let _ = PHASE_DURATION.set(phase_duration);
    let _ = SNIPPET_RUNS_TOTAL.set(snippet_runs_total);
    let _ = SNIPPET_DURATION.set(snippet_duration);
    let _ = TEST_RUNS_TOTAL.set(test_runs_total);

    tracing::info!("Prometheus metrics initialized");

    Ok(())
}

/// All registered metrics in the Prometheus text exposition format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
