//! # devpool
//!
//! Runs a stream of work items across a fixed pool of workers, one per
//! accelerator device. Each worker owns its device and one processor for the
//! whole run. A single coordinator seeds the shared input queue, drains the
//! shared output queue, replaces skipped outcomes with fresh items when asked
//! to, and stops the run on the first worker failure.

pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod device;
pub mod error;
pub mod hook;
pub mod model;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod sink;
pub mod telemetry;
pub mod worker;

pub use coordinator::{Coordinator, RunReport, RunState};
pub use error::{BoxError, Error, Result};
pub use worker::{Processor, ProcessorFactory};
