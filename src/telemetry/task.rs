//! Task execution span helpers.
//!
//! Provides span creation and status-change recording for tasks flowing
//! through the worker pool.

use crate::model::TaskId;
use tracing::Span;

/// Start a span for one worker's execution of a task.
///
/// The `task.status` field is declared empty and can be updated via
/// [`record_status_change`].
pub fn start_task_span(worker_id: usize, task_id: &TaskId) -> Span {
    tracing::info_span!(
        "task.execute",
        "worker.id" = worker_id,
        "task.id" = %task_id,
        "task.status" = tracing::field::Empty,
    )
}

/// Record a status change on the given span.
///
/// Emits a tracing `info` event scoped to the span and stores the new
/// status in its `task.status` field.
pub fn record_status_change(span: &Span, from: &str, to: &str) {
    span.record("task.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "status_change");
    });
}
