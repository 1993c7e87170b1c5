//! Device-bound workers.
//!
//! A worker binds its device, builds one processor (expensive, so it happens
//! once and is amortized over every item the worker handles), then turns
//! input items into outcomes until the input queue is closed and drained.
//! The first error ends the worker: it is pushed to the output queue as a
//! [`WorkResult::Failure`] and never retried.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use thiserror::Error;
use tracing::{Span, debug, error, info};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::device::DeviceBinding;
use crate::error::BoxError;
use crate::model::{
    FailurePhase, Outcome, Processed, WorkItem, WorkResult, WorkerFailure, WorkerState,
};
use crate::queue::{WorkReceiver, WorkSender};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_worker_span};

/// The unit that does the actual work for one item.
///
/// Owned by exactly one worker and only ever used from that worker's thread.
pub trait Processor {
    fn process(&mut self, item: &WorkItem) -> Result<Processed, BoxError>;
}

impl<F> Processor for F
where
    F: FnMut(&WorkItem) -> Result<Processed, BoxError>,
{
    fn process(&mut self, item: &WorkItem) -> Result<Processed, BoxError> {
        self(item)
    }
}

/// Builds one processor per worker, on that worker's thread, after binding.
pub trait ProcessorFactory: Send + Sync + 'static {
    type Processor: Processor;

    fn build(
        &self,
        binding: &DeviceBinding,
        config: &RunConfig,
    ) -> Result<Self::Processor, BoxError>;
}

impl<F, P> ProcessorFactory for F
where
    F: Fn(&DeviceBinding, &RunConfig) -> Result<P, BoxError> + Send + Sync + 'static,
    P: Processor,
{
    type Processor = P;

    fn build(&self, binding: &DeviceBinding, config: &RunConfig) -> Result<P, BoxError> {
        self(binding, config)
    }
}

/// A panic inside a processor or factory, converted into an error.
#[derive(Debug, Error)]
#[error("panicked: {0}")]
pub struct Panicked(pub String);

impl Panicked {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self(message)
    }
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub device: usize,
    pub state: WorkerState,
    /// Items turned into outcomes.
    pub processed: u64,
}

pub struct Worker<F: ProcessorFactory> {
    device: usize,
    factory: Arc<F>,
    config: Arc<RunConfig>,
    input: WorkReceiver<WorkItem>,
    output: WorkSender<WorkResult>,
    state: WorkerState,
    processed: u64,
    span: Span,
}

impl<F: ProcessorFactory> Worker<F> {
    pub fn new(
        run_id: Uuid,
        device: usize,
        factory: Arc<F>,
        config: Arc<RunConfig>,
        input: WorkReceiver<WorkItem>,
        output: WorkSender<WorkResult>,
    ) -> Self {
        Self {
            device,
            factory,
            config,
            input,
            output,
            state: WorkerState::Uninitialized,
            processed: 0,
            span: start_worker_span(&run_id, device),
        }
    }

    pub fn device(&self) -> usize {
        self.device
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run to a terminal state. Blocks the calling thread.
    pub fn run(mut self) -> WorkerExit {
        let span = self.span.clone();
        let _entered = span.enter();

        let binding = DeviceBinding::bind(self.device, &self.config.device_env);
        self.transition(WorkerState::Bound);
        info!(device = self.device, "worker bound");

        let factory = Arc::clone(&self.factory);
        let config = Arc::clone(&self.config);
        let built = catch_unwind(AssertUnwindSafe(|| factory.build(&binding, &config)));
        let mut processor = match built {
            Ok(Ok(processor)) => processor,
            Ok(Err(cause)) => return self.fail(None, FailurePhase::Setup, cause),
            Err(payload) => {
                let cause = Box::new(Panicked::from_payload(payload));
                return self.fail(None, FailurePhase::Setup, cause);
            }
        };
        self.transition(WorkerState::Running);

        let durations = metrics::item_duration_ms();
        let device_label = [KeyValue::new("device", self.device as i64)];

        while let Some(item) = self.input.pop() {
            let started = Instant::now();
            let result = catch_unwind(AssertUnwindSafe(|| processor.process(&item)));
            let duration_ms = started.elapsed().as_millis() as u64;

            let processed = match result {
                Ok(Ok(processed)) => processed,
                Ok(Err(cause)) => return self.fail(Some(item.seq), FailurePhase::Process, cause),
                Err(payload) => {
                    let cause = Box::new(Panicked::from_payload(payload));
                    return self.fail(Some(item.seq), FailurePhase::Process, cause);
                }
            };

            durations.record(duration_ms as f64, &device_label);
            debug!(
                device = self.device,
                seq = item.seq,
                disposition = %processed.disposition,
                duration_ms,
                "item processed"
            );

            let delivered = self.output.push(WorkResult::Outcome(Outcome {
                seq: item.seq,
                label: item.label,
                device: self.device,
                disposition: processed.disposition,
                payload: processed.payload,
                duration_ms,
            }));
            if !delivered {
                debug!(device = self.device, "output closed, stopping");
                break;
            }
            self.processed += 1;
        }

        self.transition(WorkerState::Exhausted);
        info!(
            device = self.device,
            processed = self.processed,
            "worker exhausted"
        );
        self.exit()
    }

    fn fail(mut self, seq: Option<u64>, phase: FailurePhase, cause: BoxError) -> WorkerExit {
        error!(device = self.device, ?seq, %phase, error = %cause, "worker failed");
        metrics::worker_failures().add(1, &[KeyValue::new("phase", phase.to_string())]);

        // Nobody may be listening any more; the failure is logged above.
        let _ = self.output.push(WorkResult::Failure(WorkerFailure {
            device: self.device,
            seq,
            phase,
            cause,
        }));
        self.transition(WorkerState::Failed);
        self.exit()
    }

    fn transition(&mut self, to: WorkerState) {
        let from = self.state;
        if !from.can_transition_to(to) {
            error!(device = self.device, %from, %to, "invalid worker state transition");
            debug_assert!(false, "invalid worker state transition: {from} -> {to}");
            return;
        }
        record_state_transition(&self.span, &from.to_string(), &to.to_string());
        self.state = to;
    }

    fn exit(&self) -> WorkerExit {
        WorkerExit {
            device: self.device,
            state: self.state,
            processed: self.processed,
        }
    }
}
