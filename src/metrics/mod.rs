//! Prometheus metrics for the invite reconciliation loop
//!
//! This module provides metrics tracking for:
//! - Passes: passes started, current position and size
//! - Visits: outcomes by kind, visit duration
//! - Owner notifications and manual updates
//! - Watchdog restarts
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all loop metrics
struct LoopMetrics {
    passes_started: Counter,
    pass_size: Gauge,
    pass_position: Gauge,
    visit_outcomes: CounterVec,
    visit_duration: Histogram,
    notifications: CounterVec,
    manual_updates: CounterVec,
    watchdog_restarts: Counter,
}

/// Global storage for loop metrics
static LOOP_METRICS: OnceLock<LoopMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, errors are logged and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = invitekeeper::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    // Prevent double initialization
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = LoopMetrics {
        passes_started: register_counter!(
            "invitekeeper_passes_started_total",
            "Total number of reconciliation passes started"
        )?,
        pass_size: register_gauge!(
            "invitekeeper_pass_size",
            "Number of servers in the current pass"
        )?,
        pass_position: register_gauge!(
            "invitekeeper_pass_position",
            "Cursor position in the current pass"
        )?,
        visit_outcomes: register_counter_vec!(
            "invitekeeper_visits_total",
            "Server visits by outcome",
            &["outcome"]
        )?,
        visit_duration: register_histogram!(
            "invitekeeper_visit_duration_seconds",
            "Time spent reconciling one server in seconds",
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
        notifications: register_counter_vec!(
            "invitekeeper_owner_notifications_total",
            "Owner notification decisions by result",
            &["result"]
        )?,
        manual_updates: register_counter_vec!(
            "invitekeeper_manual_updates_total",
            "Manual invite updates by result",
            &["result"]
        )?,
        watchdog_restarts: register_counter!(
            "invitekeeper_watchdog_restarts_total",
            "Number of passes restarted by the watchdog"
        )?,
    };

    LOOP_METRICS.set(metrics).ok();

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    LOOP_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record the start of a pass over `size` servers
pub fn record_pass_started(size: usize) {
    let Some(m) = LOOP_METRICS.get() else {
        return;
    };

    m.passes_started.inc();
    m.pass_size.set(size as f64);
    m.pass_position.set(0.0);
}

/// Update the cursor position gauge
pub fn record_pass_position(position: usize) {
    if let Some(m) = LOOP_METRICS.get() {
        m.pass_position.set(position as f64);
    }
}

/// Record the outcome of one server visit
pub fn record_visit(outcome: &str) {
    if let Some(m) = LOOP_METRICS.get() {
        m.visit_outcomes.with_label_values(&[outcome]).inc();
    }
}

/// Record an owner notification decision
pub fn record_notification(result: &str) {
    if let Some(m) = LOOP_METRICS.get() {
        m.notifications.with_label_values(&[result]).inc();
    }
}

/// Record a manual update attempt
pub fn record_manual_update(result: &str) {
    if let Some(m) = LOOP_METRICS.get() {
        m.manual_updates.with_label_values(&[result]).inc();
    }
}

/// Record a watchdog restart
pub fn record_watchdog_restart() {
    if let Some(m) = LOOP_METRICS.get() {
        m.watchdog_restarts.inc();
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a visit timer (records when dropped)
pub fn start_visit_timer() -> MetricsTimer {
    match LOOP_METRICS.get() {
        Some(m) => MetricsTimer::new(m.visit_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
