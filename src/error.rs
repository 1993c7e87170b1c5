//! Error types for devpool.

use thiserror::Error;

use crate::model::FailurePhase;

/// Error type produced by processors and processor factories.
///
/// Opaque to the pool: it is carried through the output queue and surfaced
/// unchanged as the source of [`Error::Worker`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no devices available: {0}")]
    NoDevices(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("dataset exhausted after {pulled} items ({finalized}/{target} finalized)")]
    DatasetExhausted {
        pulled: u64,
        finalized: usize,
        target: usize,
    },

    #[error("worker on device {device} failed during {phase}")]
    Worker {
        device: usize,
        seq: Option<u64>,
        phase: FailurePhase,
        #[source]
        cause: BoxError,
    },

    #[error("sink error: {0}")]
    Sink(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
