#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Local geometry cache for crash records.
//!
//! Each city's trailing window is persisted in a `DuckDB` file at
//! `data/cache/{city}.duckdb` and mirrored in memory with an R-tree over
//! the stored bounding boxes. See [`cache_store::CacheStore`].

pub mod cache_store;
pub mod paths;

pub use cache_store::CacheStore;

/// Errors that can occur during cache storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// `DuckDB` query or connection error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Filesystem error while preparing the cache location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attribute payload could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row could not be turned back into a record.
    #[error("Corrupt cache row: {message}")]
    Corrupt {
        /// Description of what went wrong.
        message: String,
    },
}
