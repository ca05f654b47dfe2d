#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crash data source trait and normalization logic.
//!
//! Each city implements the [`CrashSource`] trait to fetch a rolling window
//! of crash records and normalize them into canonical [`PointRecord`]s. In
//! practice every city is a config-driven [`source_def::CitySource`] loaded
//! from the embedded TOML [`registry`].

pub mod parsing;
pub mod registry;
pub mod socrata;
pub mod source_def;

use async_trait::async_trait;
use crash_map_crash_models::{BoundingBox, PointRecord};

/// Errors that can occur while fetching from an upstream data source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (connection, timeout, or non-success status).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Source configuration could not be parsed.
    #[error("Source config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Parameters for fetching a rolling window of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// How many days back from today the window starts.
    pub days_back: u32,
    /// Maximum number of raw records to request.
    pub limit: u64,
}

/// Trait that all crash data sources must implement.
///
/// Implementations guarantee that every returned record has valid WGS84
/// coordinates inside [`CrashSource::bounds`], a parsed timestamp, and a
/// non-empty external id. Malformed rows are dropped, not returned.
#[async_trait]
pub trait CrashSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"nyc"`).
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Returns the coverage area of this source.
    fn bounds(&self) -> BoundingBox;

    /// Fetches and normalizes the records of the trailing window.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the upstream request fails or times out.
    async fn fetch_window(&self, options: &FetchOptions) -> Result<Vec<PointRecord>, SourceError>;
}
