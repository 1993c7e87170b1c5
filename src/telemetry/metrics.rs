//! Metric instrument factories for devpool.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("devpool")
}

/// Counter: items pushed onto the input queue.
/// Labels: `reason` ("seed" | "requeue").
pub fn items_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("devpool.items.dispatched")
        .with_description("Number of work items pushed to the input queue")
        .build()
}

/// Counter: outcomes handed to the result sink.
/// Labels: `disposition`.
pub fn items_finalized() -> Counter<u64> {
    meter()
        .u64_counter("devpool.items.finalized")
        .with_description("Number of outcomes finalized by the coordinator")
        .build()
}

/// Counter: skipped outcomes discarded and replaced by a fresh item.
pub fn items_requeued() -> Counter<u64> {
    meter()
        .u64_counter("devpool.items.requeued")
        .with_description("Number of skipped outcomes replaced with a fresh item")
        .build()
}

/// Counter: terminal worker failures.
/// Labels: `phase` ("setup" | "process").
pub fn worker_failures() -> Counter<u64> {
    meter()
        .u64_counter("devpool.worker.failures")
        .with_description("Number of workers that terminated with an error")
        .build()
}

/// Histogram: per-item processing time in milliseconds.
/// Labels: `device`.
pub fn item_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("devpool.item.duration_ms")
        .with_description("Per-item processing time")
        .with_unit("ms")
        .build()
}
