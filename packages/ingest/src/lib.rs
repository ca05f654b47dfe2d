#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Refreshing the local crash cache from an upstream source.
//!
//! A refresh fetches the trailing window from a [`CrashSource`] without
//! holding the store lock, then swaps it into the [`CacheStore`] with one
//! atomic replace. A failed fetch never touches the cache.
//!
//! [`export`] writes a cache out as GeoJSON and [`pipeline`] runs the batch
//! road risk analysis over a synthetic network.

pub mod export;
pub mod pipeline;

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crash_map_analytics::AnalyticsError;
use crash_map_database::{CacheStore, StorageError};
use crash_map_source::source_def::CitySource;
use crash_map_source::{CrashSource, FetchOptions, SourceError};

/// Days of history kept in the cache.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Maximum number of records requested per refresh.
pub const DEFAULT_FETCH_LIMIT: u64 = 5000;

/// Age after which a cache is considered stale.
pub const DEFAULT_MAX_CACHE_AGE_HOURS: i64 = 24;

/// Errors that can occur while refreshing the cache.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Upstream fetch failed.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Writing the fetched window failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Synthetic network generation failed.
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    /// Writing an output file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding an output file failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No city is configured under this id.
    #[error("Unknown source: {id}")]
    UnknownSource {
        /// The requested source id.
        id: String,
    },
}

/// Result of a completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Id of the source that was fetched.
    pub source_id: String,
    /// Normalized records returned by the source.
    pub records_fetched: u64,
    /// Rows written to the cache.
    pub records_written: u64,
    /// How long the refresh took.
    pub duration: Duration,
}

/// Returns all configured city sources from the TOML registry.
#[must_use]
pub fn all_sources() -> Vec<CitySource> {
    crash_map_source::registry::all_sources()
}

/// Looks up a configured city source.
///
/// # Errors
///
/// Returns [`IngestError::UnknownSource`] if no city has this id.
pub fn find_source(id: &str) -> Result<CitySource, IngestError> {
    crash_map_source::registry::find_source(id).ok_or_else(|| {
        log::warn!(
            "No source {id:?}. Available: {}",
            all_sources()
                .iter()
                .map(|s| s.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        IngestError::UnknownSource { id: id.to_string() }
    })
}

/// Cache file for a city: `CRASH_MAP_CACHE_PATH` if set, otherwise
/// `data/cache/{city}.duckdb`.
#[must_use]
pub fn cache_path(city_id: &str) -> PathBuf {
    std::env::var("CRASH_MAP_CACHE_PATH").map_or_else(
        |_| crash_map_database::paths::cache_db_path(city_id),
        PathBuf::from,
    )
}

/// Whether a cache last refreshed at `last_refresh` needs a refresh at
/// `now`. A cache that was never refreshed is always stale.
#[must_use]
pub fn is_stale(
    last_refresh: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_age: chrono::Duration,
) -> bool {
    last_refresh.is_none_or(|last| now - last > max_age)
}

/// Fetches the trailing window from `source` and atomically replaces the
/// cache contents with it.
///
/// The store lock is only taken for the replace, so readers keep seeing
/// the previous window while the fetch is in flight.
///
/// # Errors
///
/// Returns [`IngestError::Source`] if the fetch fails (the cache is left
/// untouched) or [`IngestError::Storage`] if the replace fails (rolled
/// back).
pub async fn refresh(
    source: &dyn CrashSource,
    store: &Mutex<CacheStore>,
    options: &FetchOptions,
) -> Result<RefreshOutcome, IngestError> {
    let start = Instant::now();
    log::info!(
        "Refreshing {} ({}): last {} days, limit {}",
        source.name(),
        source.id(),
        options.days_back,
        options.limit
    );

    let records = source.fetch_window(options).await.inspect_err(|e| {
        log::error!("{}: fetch failed: {e}", source.id());
    })?;
    let records_fetched = records.len() as u64;

    let records_written = {
        let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
        store.clear_and_replace(&records).inspect_err(|e| {
            log::error!("{}: cache replace failed: {e}", source.id());
        })?
    };

    let duration = start.elapsed();
    log::info!(
        "{}: refreshed cache with {records_written} of {records_fetched} records in {:.1}s",
        source.id(),
        duration.as_secs_f64()
    );

    Ok(RefreshOutcome {
        source_id: source.id().to_string(),
        records_fetched,
        records_written,
        duration,
    })
}
