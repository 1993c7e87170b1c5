//! Span helpers for runs and workers.

use tracing::Span;
use uuid::Uuid;

/// Start the span that wraps a whole run.
///
/// `run.finalized` is declared empty and filled in when the run ends.
pub fn start_run_span(run_id: &Uuid, target: usize, devices: usize) -> Span {
    tracing::info_span!(
        "run",
        "run.id" = %run_id,
        "run.target" = target,
        "run.devices" = devices,
        "run.finalized" = tracing::field::Empty,
    )
}

/// Start the span for one worker thread.
pub fn start_worker_span(run_id: &Uuid, device: usize) -> Span {
    tracing::info_span!(
        "worker",
        "run.id" = %run_id,
        "worker.device" = device,
        "worker.state" = tracing::field::Empty,
    )
}

/// Record a worker state transition on its span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("worker.state", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "state_transition");
    });
}
