//! Integration tests for telemetry initialization and span helpers.

use taskq::model::TaskId;
use taskq::telemetry::{TelemetryConfig, init_telemetry, metrics, task};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process; an error here
    // means another test got there first, which is acceptable.
    let config = TelemetryConfig {
        log_level: "debug".to_string(),
        ..TelemetryConfig::new("taskq-test")
    };
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn invalid_log_level_is_a_config_error() {
    // RUST_LOG takes precedence over the configured level.
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let config = TelemetryConfig {
        log_level: "taskq=loud".to_string(),
        ..TelemetryConfig::new("taskq-test")
    };
    assert!(matches!(
        init_telemetry(config),
        Err(taskq::error::Error::Config(_))
    ));
}

#[test]
fn task_span_creates_and_records_status_change() {
    let id = TaskId::new();
    let span = task::start_task_span(3, &id);
    task::record_status_change(&span, "pending", "done");
}

#[test]
fn metric_instruments_work_without_a_provider() {
    metrics::tasks_created().add(1, &[]);
    metrics::task_status_updates().add(1, &[]);
    metrics::queue_operations().add(1, &[]);
    metrics::worker_decode_errors().add(1, &[]);
    metrics::task_duration_ms().record(1.5, &[]);
}
