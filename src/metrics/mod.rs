//! Prometheus metrics for the Insider poller
//!
//! This module tracks:
//! - API client: requests by endpoint and status, latency, re-authentications
//! - Update cycles: outcome, duration, machines seen, per-machine fetch failures
//! - New high scores announced per machine
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, or is never attempted, metric operations are no-ops.
//! `write_metrics_file()` exports them in the Prometheus text format, e.g. for
//! node_exporter's textfile collector.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Metrics recorded by the API client
struct ApiMetrics {
    requests: CounterVec,
    request_duration: HistogramVec,
    reauthentications: Counter,
}

/// Metrics recorded by the update coordinator
struct CycleMetrics {
    cycles: CounterVec,
    cycle_duration: HistogramVec,
    machines: Gauge,
    score_fetch_failures: CounterVec,
    new_high_scores: CounterVec,
}

static API_METRICS: OnceLock<ApiMetrics> = OnceLock::new();

static CYCLE_METRICS: OnceLock<CycleMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = stern_insider::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let api = ApiMetrics {
        requests: register_counter_vec!(
            "stern_insider_api_requests_total",
            "Total Insider API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        request_duration: register_histogram_vec!(
            "stern_insider_api_request_duration_seconds",
            "Insider API request duration in seconds",
            &["endpoint"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
        )?,
        reauthentications: register_counter!(
            "stern_insider_reauthentications_total",
            "Requests rejected with 401/403 that triggered a fresh login"
        )?,
    };

    let cycle = CycleMetrics {
        cycles: register_counter_vec!(
            "stern_insider_update_cycles_total",
            "Update cycles by outcome",
            &["outcome"]
        )?,
        cycle_duration: register_histogram_vec!(
            "stern_insider_update_cycle_duration_seconds",
            "Time spent in one update cycle in seconds",
            &["outcome"],
            vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
        )?,
        machines: register_gauge!(
            "stern_insider_machines",
            "Machines in the latest published snapshot"
        )?,
        score_fetch_failures: register_counter_vec!(
            "stern_insider_score_fetch_failures_total",
            "High score fetches that failed and kept stale data",
            &["machine_id"]
        )?,
        new_high_scores: register_counter_vec!(
            "stern_insider_new_high_scores_total",
            "New high score events announced",
            &["machine_id"]
        )?,
    };

    API_METRICS.set(api).map_err(|_| "API metrics already initialized")?;
    CYCLE_METRICS.set(cycle).map_err(|_| "Cycle metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    API_METRICS.get().is_some() && CYCLE_METRICS.get().is_some()
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

/// Write all metrics to `path` in Prometheus text format
///
/// The text goes to a sibling `.tmp` file that is then renamed over `path`.
pub async fn write_metrics_file(path: &Path) -> std::io::Result<()> {
    let text = encode_metrics().map_err(|e| std::io::Error::other(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Record one API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = API_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.requests.with_label_values(&[endpoint, &status_str]).inc();
    m.request_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

/// Record a token rejection that forced a fresh login
pub fn record_reauthentication() {
    if let Some(m) = API_METRICS.get() {
        m.reauthentications.inc();
    }
}

/// Record a finished update cycle
pub fn record_cycle(outcome: &str, duration_secs: f64) {
    let Some(m) = CYCLE_METRICS.get() else {
        return;
    };

    m.cycles.with_label_values(&[outcome]).inc();
    m.cycle_duration
        .with_label_values(&[outcome])
        .observe(duration_secs);
}

/// Update the number of machines in the published snapshot
pub fn set_machine_count(count: usize) {
    if let Some(m) = CYCLE_METRICS.get() {
        m.machines.set(count as f64);
    }
}

/// Record a per-machine score fetch that failed
pub fn record_score_fetch_failure(machine_id: &str) {
    if let Some(m) = CYCLE_METRICS.get() {
        m.score_fetch_failures.with_label_values(&[machine_id]).inc();
    }
}

/// Record an announced new high score
pub fn record_new_high_score(machine_id: &str) {
    if let Some(m) = CYCLE_METRICS.get() {
        m.new_high_scores.with_label_values(&[machine_id]).inc();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());
        // idempotent
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_metrics() {
        ensure_metrics_initialized();
        record_cycle("success", 1.5);
        let text = encode_metrics().unwrap();
        assert!(text.contains("stern_insider_update_cycles_total"));
    }

    #[tokio::test]
    async fn test_write_metrics_file() {
        ensure_metrics_initialized();
        record_new_high_score("m42");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stern_insider.prom");
        write_metrics_file(&path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("stern_insider_new_high_scores_total"));
        assert!(text.contains("m42"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_api_recording() {
        ensure_metrics_initialized();
        record_api_request("machines", 200, 0.25);
        record_api_request("login", 401, 0.1);
        record_reauthentication();
    }

    #[test]
    fn test_cycle_recording() {
        ensure_metrics_initialized();
        set_machine_count(3);
        record_score_fetch_failure("m1");
        record_new_high_score("m1");
        record_cycle("update_failed", 0.5);
    }
}
