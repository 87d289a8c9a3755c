//! Metric instrument factories for taskq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"taskq"` meter.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskq")
}

/// Counter: tasks created in the store.
/// Labels: `backend`, `result` ("ok" | "error").
pub fn tasks_created() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.created")
        .with_description("Number of tasks created")
        .build()
}

/// `result` label for an operation outcome: `"ok"` or `"error"`.
pub fn result_label<T, E>(outcome: &std::result::Result<T, E>) -> &'static str {
    if outcome.is_ok() { "ok" } else { "error" }
}

/// Count one create attempt against [`tasks_created`], duplicates included,
/// so every store backend reports the same series.
pub fn record_task_created<T, E>(backend: &'static str, outcome: &std::result::Result<T, E>) {
    tasks_created().add(
        1,
        &[
            KeyValue::new("backend", backend),
            KeyValue::new("result", result_label(outcome)),
        ],
    );
}

/// Counter: task status writes.
/// Labels: `backend`, `status`.
pub fn task_status_updates() -> Counter<u64> {
    meter()
        .u64_counter("taskq.tasks.status_updates")
        .with_description("Number of task status updates")
        .build()
}

/// Counter: queue-level operations (push, push_dropped, receive, lagged).
/// Labels: `channel`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("taskq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: messages a worker could not decode into a task.
pub fn worker_decode_errors() -> Counter<u64> {
    meter()
        .u64_counter("taskq.worker.decode_errors")
        .with_description("Queue messages that failed to decode")
        .build()
}

/// Histogram: task body duration in milliseconds.
/// Labels: `status`.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskq.task.duration_ms")
        .with_description("Task execution duration in milliseconds")
        .with_unit("ms")
        .build()
}
