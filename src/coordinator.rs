//! Run coordination.
//!
//! The coordinator seeds the input queue with `target` items, starts the
//! worker pool, and drains the output queue. Each outcome is either
//! finalized (logged to the sink, progress advances) or, when skip
//! replacement is on and the outcome is a skip, discarded and replaced by
//! exactly one fresh item from the dataset. A worker failure ends the run
//! at once, with no summary.
//!
//! Outcomes are finalized in the order the output queue yields them. Across
//! workers that order is not deterministic.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::dataset::DatasetSource;
use crate::error::{Error, Result};
use crate::model::{WorkItem, WorkResult};
use crate::pool::WorkerPool;
use crate::progress::Progress;
use crate::queue::work_queue;
use crate::sink::ResultSink;
use crate::telemetry::metrics;
use crate::telemetry::work::start_run_span;
use crate::worker::{ProcessorFactory, WorkerExit};

/// Counters for one run. Written only by the coordinator.
///
/// `finalized + in_flight == target` holds after every fill step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    target: usize,
    finalized: usize,
    in_flight: usize,
    pulled: u64,
    requeued: u64,
}

impl RunState {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            finalized: 0,
            in_flight: 0,
            pulled: 0,
            requeued: 0,
        }
    }

    /// A seed item was pushed.
    pub fn dispatch(&mut self) {
        debug_assert!(self.finalized + self.in_flight < self.target);
        self.in_flight += 1;
        self.pulled += 1;
    }

    /// An outcome was finalized.
    pub fn finalize(&mut self) {
        debug_assert!(self.in_flight > 0);
        self.in_flight -= 1;
        self.finalized += 1;
    }

    /// A skip was discarded and a fresh item pushed in its place.
    pub fn replace(&mut self) {
        debug_assert!(self.in_flight > 0);
        self.pulled += 1;
        self.requeued += 1;
    }

    pub fn is_complete(&self) -> bool {
        self.finalized == self.target
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn finalized(&self) -> usize {
        self.finalized
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Items taken from the dataset so far.
    pub fn pulled(&self) -> u64 {
        self.pulled
    }

    pub fn requeued(&self) -> u64 {
        self.requeued
    }
}

/// What a completed run looked like.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub devices: usize,
    pub workers: Vec<WorkerExit>,
    pub started_at: DateTime<Utc>,
    /// Seeding plus pool start.
    pub setup: Duration,
    /// From pool start to the last finalized outcome and worker exit.
    pub processing: Duration,
}

pub struct Coordinator<D, S> {
    run_id: Uuid,
    config: Arc<RunConfig>,
    dataset: D,
    sink: S,
    progress: Progress,
}

impl<D: DatasetSource, S: ResultSink> Coordinator<D, S> {
    pub fn new(config: impl Into<Arc<RunConfig>>, dataset: D, sink: S) -> Self {
        let config = config.into();
        let progress = Progress::hidden(config.target);
        Self {
            run_id: Uuid::new_v4(),
            config,
            dataset,
            sink,
            progress,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Drive one run to completion on `devices` workers.
    ///
    /// Blocks the calling thread. Returns the first worker failure as
    /// [`Error::Worker`]; remaining workers are left to finish the item they
    /// hold and exit on their own.
    pub fn run<F: ProcessorFactory>(&mut self, factory: F, devices: usize) -> Result<RunReport> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let target = self.config.target;

        let span = start_run_span(&self.run_id, target, devices);
        let _entered = span.enter();

        let (input, input_rx) = work_queue::<WorkItem>();
        let (output_tx, output) = work_queue::<WorkResult>();
        let mut state = RunState::new(target);

        let dispatched = metrics::items_dispatched();
        for _ in 0..target {
            let item = self.pull(&state)?;
            input.push(item);
            state.dispatch();
        }
        dispatched.add(target as u64, &[KeyValue::new("reason", "seed")]);
        info!(target, devices, offset = self.config.offset, "input seeded");

        if target == 0 {
            info!("nothing to do");
            self.progress.finish();
            self.sink.log_summary()?;
            self.sink.flush()?;
            return Ok(RunReport {
                run_id: self.run_id,
                state,
                devices,
                workers: Vec::new(),
                started_at,
                setup: clock.elapsed(),
                processing: Duration::ZERO,
            });
        }

        let pool = WorkerPool::spawn(
            self.run_id,
            devices,
            Arc::new(factory),
            Arc::clone(&self.config),
            input_rx,
            output_tx,
        )?;
        let setup = clock.elapsed();
        let processing_clock = Instant::now();

        let finalized = metrics::items_finalized();
        let requeued = metrics::items_requeued();

        while !state.is_complete() {
            let outcome = match output.pop() {
                Some(WorkResult::Outcome(outcome)) => outcome,
                Some(WorkResult::Failure(failure)) => {
                    self.progress.abandon();
                    error!(
                        device = failure.device,
                        seq = ?failure.seq,
                        phase = %failure.phase,
                        finalized = state.finalized(),
                        "aborting run on worker failure"
                    );
                    return Err(failure.into());
                }
                None => {
                    // Every worker thread is gone without reporting a failure.
                    self.progress.abandon();
                    return Err(Error::Other(format!(
                        "all workers exited with {} of {target} outcomes finalized",
                        state.finalized()
                    )));
                }
            };

            if outcome.disposition.counts() || !self.config.replace_skips {
                self.sink.log_result(&outcome)?;
                state.finalize();
                self.progress.advance();
                finalized.add(
                    1,
                    &[KeyValue::new("disposition", outcome.disposition.to_string())],
                );
            } else {
                let item = self.pull(&state)?;
                debug!(
                    discarded = outcome.seq,
                    replacement = item.seq,
                    "skipped outcome replaced"
                );
                input.push(item);
                state.replace();
                self.progress.note_requeue(state.requeued());
                requeued.add(1, &[]);
                dispatched.add(1, &[KeyValue::new("reason", "requeue")]);
            }
        }

        drop(input);
        let workers = pool.join();
        let processing = processing_clock.elapsed();
        self.progress.finish();
        span.record("run.finalized", state.finalized());
        info!(
            finalized = state.finalized(),
            requeued = state.requeued(),
            setup_ms = setup.as_millis() as u64,
            processing_ms = processing.as_millis() as u64,
            "run complete"
        );

        self.sink.log_summary()?;
        self.sink.flush()?;

        Ok(RunReport {
            run_id: self.run_id,
            state,
            devices,
            workers,
            started_at,
            setup,
            processing,
        })
    }

    fn pull(&mut self, state: &RunState) -> Result<WorkItem> {
        self.dataset
            .next_item()?
            .ok_or(Error::DatasetExhausted {
                pulled: state.pulled(),
                finalized: state.finalized(),
                target: state.target(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_keeps_in_flight_and_finalized() {
        let mut state = RunState::new(3);
        for _ in 0..3 {
            state.dispatch();
        }
        assert_eq!(state.in_flight(), 3);

        state.replace();
        assert_eq!(state.in_flight(), 3);
        assert_eq!(state.finalized(), 0);
        assert_eq!(state.pulled(), 4);
        assert_eq!(state.requeued(), 1);
    }

    #[test]
    fn finalize_moves_one_from_in_flight() {
        let mut state = RunState::new(2);
        state.dispatch();
        state.dispatch();

        state.finalize();
        assert_eq!(state.finalized() + state.in_flight(), state.target());
        assert!(!state.is_complete());

        state.finalize();
        assert!(state.is_complete());
        assert_eq!(state.in_flight(), 0);
    }
}
