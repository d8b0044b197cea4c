//! Write path: current values, daily companions, history and trends
//!
//! Batches enter through [`Ingestor`], usually via a [`Dispatcher`] that
//! keeps each station on a single worker so its writes stay ordered.

pub mod current;
pub mod dispatch;
pub mod history;
pub mod ingestor;
pub mod trend;

pub use current::*;
pub use dispatch::*;
pub use history::*;
pub use ingestor::*;
pub use trend::*;

use chrono_tz::Tz;
use thiserror::Error;
use wxnorm_core::{BoundaryRules, CanonicalError, Timestamp};
use wxnorm_db::DbError;

/// Facility name carried by structured events from this crate
pub const FACILITY: &str = "ingest";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed batch: {0}")]
    MalformedBatch(#[from] CanonicalError),

    #[error("Storage failure: {0}")]
    Storage(#[from] DbError),

    #[error("Ingest queue closed")]
    QueueClosed,

    #[error("Worker dropped the batch before replying")]
    WorkerGone,
}

impl IngestError {
    pub fn code(&self) -> u32 {
        match self {
            IngestError::MalformedBatch(_) => 201,
            IngestError::Storage(_) => 301,
            IngestError::QueueClosed | IngestError::WorkerGone => 302,
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Per-write parameters resolved once per batch
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    pub timezone: Tz,
    pub collect_history: bool,
    pub rules: &'a BoundaryRules,
    pub now: Timestamp,
}
