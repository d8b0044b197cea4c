//! Read side: station listings and obsolescence-aware measurement queries

pub mod layer;
pub mod views;

pub use layer::*;
pub use views::*;

use thiserror::Error;
use wxnorm_db::DbError;

#[derive(Debug, Error)]
pub enum QueryError {
    /// A stored row could not be interpreted
    #[error("inconsistent data: {0}")]
    InconsistentData(String),

    #[error("inconsistent data: storage failure: {0}")]
    Storage(#[from] DbError),
}

pub type QueryResult<T> = Result<T, QueryError>;
