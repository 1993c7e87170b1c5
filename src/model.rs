//! Core data model.
//!
//! A work item is one record pulled from the dataset. Workers turn each item
//! into exactly one [`WorkResult`]: an [`Outcome`] that either counts toward
//! the run's target or is a skip, or a terminal [`WorkerFailure`].

use serde::{Deserialize, Serialize};

use crate::error::{BoxError, Error};

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of input pulled from the dataset. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Zero-based position in the dataset stream, offset included.
    pub seq: u64,

    /// Ground-truth label. Opaque to the pool.
    pub label: serde_json::Value,

    /// The input itself. Opaque to the pool.
    pub content: serde_json::Value,
}

impl WorkItem {
    pub fn new(
        seq: u64,
        label: impl Into<serde_json::Value>,
        content: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            seq,
            label: label.into(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Whether an outcome counts toward the run's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Counts toward completion.
    Counted,
    /// Does not count. Replaced by a fresh item when skip replacement is on.
    Skipped,
}

impl Disposition {
    pub fn counts(self) -> bool {
        matches!(self, Disposition::Counted)
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Disposition::Counted => "counted",
            Disposition::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// What a processor returns for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processed {
    pub disposition: Disposition,
    /// Arbitrary result data. Opaque to the pool.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Processed {
    pub fn counted(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            disposition: Disposition::Counted,
            payload: payload.into(),
        }
    }

    pub fn skipped(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            disposition: Disposition::Skipped,
            payload: payload.into(),
        }
    }
}

/// A processed item as delivered to the coordinator and the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub seq: u64,
    pub label: serde_json::Value,
    /// Device handle of the worker that produced it.
    pub device: usize,
    pub disposition: Disposition,
    pub payload: serde_json::Value,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

/// Where in a worker's life a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    /// Building the processor.
    Setup,
    /// Processing an item.
    Process,
}

impl std::fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailurePhase::Setup => "setup",
            FailurePhase::Process => "process",
        };
        write!(f, "{s}")
    }
}

/// A terminal worker error. Never retried.
#[derive(Debug)]
pub struct WorkerFailure {
    pub device: usize,
    /// The item being processed, if the failure happened after setup.
    pub seq: Option<u64>,
    pub phase: FailurePhase,
    pub cause: BoxError,
}

impl From<WorkerFailure> for Error {
    fn from(failure: WorkerFailure) -> Self {
        Error::Worker {
            device: failure.device,
            seq: failure.seq,
            phase: failure.phase,
            cause: failure.cause,
        }
    }
}

/// Everything that travels through the output queue.
#[derive(Debug)]
pub enum WorkResult {
    Outcome(Outcome),
    Failure(WorkerFailure),
}

// ---------------------------------------------------------------------------
// Worker State
// ---------------------------------------------------------------------------

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Thread started, no device yet.
    Uninitialized,
    /// Device bound, processor not yet built.
    Bound,
    /// Processor built, consuming items.
    Running,
    /// Input drained and closed. Terminal.
    Exhausted,
    /// Setup or processing error. Terminal.
    Failed,
}

impl WorkerState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, to),
            (Uninitialized, Bound)
                | (Bound, Running)
                | (Bound, Failed)       // processor could not be built
                | (Running, Exhausted)
                | (Running, Failed)
        )
    }

    /// Is this a terminal state?
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerState::Exhausted | WorkerState::Failed)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Bound => "bound",
            WorkerState::Running => "running",
            WorkerState::Exhausted => "exhausted",
            WorkerState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
