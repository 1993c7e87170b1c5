//! Fixed-size pool of device-bound worker threads.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::model::{WorkItem, WorkResult, WorkerState};
use crate::queue::{WorkReceiver, WorkSender};
use crate::worker::{ProcessorFactory, Worker, WorkerExit};

/// Owns one worker thread per device. Does not own the queues.
///
/// Workers run until the input queue is closed (every sender dropped) and
/// drained. Dropping a pool without [`WorkerPool::join`] discards whatever is
/// still queued and detaches the threads: each finishes the item it holds
/// and exits once the input's senders are gone.
pub struct WorkerPool {
    input: WorkReceiver<WorkItem>,
    workers: Vec<(usize, JoinHandle<WorkerExit>)>,
}

impl WorkerPool {
    /// Spawn `devices` workers bound to handles `0..devices`.
    pub fn spawn<F: ProcessorFactory>(
        run_id: Uuid,
        devices: usize,
        factory: Arc<F>,
        config: Arc<RunConfig>,
        input: WorkReceiver<WorkItem>,
        output: WorkSender<WorkResult>,
    ) -> Result<Self> {
        if devices == 0 {
            return Err(Error::NoDevices(
                "cannot create a worker pool with 0 devices".to_string(),
            ));
        }

        let mut pool = Self {
            input: input.clone(),
            workers: Vec::with_capacity(devices),
        };

        for device in 0..devices {
            let worker = Worker::new(
                run_id,
                device,
                Arc::clone(&factory),
                Arc::clone(&config),
                input.clone(),
                output.clone(),
            );
            // On error the partially built pool is dropped, which empties the
            // input so the workers already started stop early.
            let handle = thread::Builder::new()
                .name(format!("devpool-worker-{device}"))
                .spawn(move || worker.run())?;
            pool.workers.push((device, handle));
        }

        info!(devices, "worker pool started");
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Device handles, in spawn order.
    pub fn devices(&self) -> Vec<usize> {
        self.workers.iter().map(|(device, _)| *device).collect()
    }

    /// Wait for every worker to finish.
    ///
    /// Workers only finish once the input queue is closed, so the caller
    /// drops its input senders first.
    pub fn join(mut self) -> Vec<WorkerExit> {
        let workers = std::mem::take(&mut self.workers);

        workers
            .into_iter()
            .map(|(device, handle)| {
                handle.join().unwrap_or_else(|_| {
                    // Worker::run catches processor panics, so this is a bug
                    // in the worker loop itself.
                    error!(device, "worker thread panicked");
                    WorkerExit {
                        device,
                        state: WorkerState::Failed,
                        processed: 0,
                    }
                })
            })
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let discarded = self.input.drain();
            debug!(workers = self.workers.len(), discarded, "detaching worker pool");
        }
    }
}
