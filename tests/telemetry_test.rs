//! Integration tests for telemetry initialization and span helpers.

use devpool::model::WorkerState;
use devpool::telemetry::{self, TelemetryConfig, metrics, work};
use opentelemetry::KeyValue;
use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process, so a second
    // init from another test may fail; that is acceptable here.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "devpool-test".to_string(),
        default_filter: "debug".to_string(),
    };
    if let Ok(guard) = telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn run_span_records_finalized_count() {
    let id = Uuid::new_v4();
    let span = work::start_run_span(&id, 5, 2);
    span.record("run.finalized", 5);
}

#[test]
fn worker_span_records_transitions() {
    let id = Uuid::new_v4();
    let span = work::start_worker_span(&id, 3);
    work::record_state_transition(
        &span,
        &WorkerState::Uninitialized.to_string(),
        &WorkerState::Bound.to_string(),
    );
    work::record_state_transition(&span, "bound", "running");
}

#[test]
fn metric_instruments_accept_measurements() {
    metrics::items_dispatched().add(3, &[KeyValue::new("reason", "seed")]);
    metrics::items_finalized().add(1, &[KeyValue::new("disposition", "counted")]);
    metrics::items_requeued().add(1, &[]);
    metrics::worker_failures().add(1, &[KeyValue::new("phase", "setup")]);
    metrics::item_duration_ms().record(12.5, &[KeyValue::new("device", 0_i64)]);
}

#[tokio::test]
#[ignore = "requires an OTLP collector on localhost:4317"]
async fn telemetry_exports_to_collector() {
    let config = TelemetryConfig {
        endpoint: Some("http://localhost:4317".to_string()),
        service_name: "devpool-test".to_string(),
        default_filter: "info".to_string(),
    };
    let guard = telemetry::init_telemetry(config).expect("init telemetry");
    assert!(guard.is_exporting());

    let span = work::start_run_span(&Uuid::new_v4(), 1, 1);
    span.in_scope(|| tracing::info!("exported"));
    drop(span);
    guard.force_flush();
}
