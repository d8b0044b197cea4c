//! Core vocabulary, validation and normalization for weather measurements
//!
//! This crate holds everything that can be decided without storage: the
//! closed vocabularies, batch canonicalization, boundary validation, derived
//! quantities, local-time arithmetic and trend math.

pub mod boundary;
pub mod canonical;
pub mod health;
pub mod obsolescence;
pub mod psychro;
pub mod timegrid;
pub mod trend;
pub mod types;
pub mod validate;
pub mod vocab;

pub use boundary::*;
pub use canonical::*;
pub use obsolescence::*;
pub use types::*;
pub use validate::*;
pub use vocab::*;
