//! Storage and cache collaborators for measurement ingestion
//!
//! The engine talks to storage through [`MeasurementStore`]. `DbClient`
//! implements it over MySQL; `MemoryStore` implements it in process for
//! tests and single-node deployments. Schema is created from the DDL in
//! [`schema::CREATE_TABLES`].

pub mod cache;
pub mod client;
pub mod memory;
pub mod queries;
pub mod schema;
pub mod store;

pub use cache::*;
pub use client::*;
pub use memory::*;
pub use schema::*;
pub use store::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type DbResult<T> = Result<T, DbError>;
