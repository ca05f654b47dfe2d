//! Request-level query engine.
//!
//! Validates query parameters, refreshes the cache when it is stale or the
//! caller asks for it, and runs the spatial query plus any aggregation over
//! the cached points. Handlers never talk to the store directly.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use crash_map_analytics::AnalyticsError;
use crash_map_analytics::hotspots::compute_hotspots;
use crash_map_analytics::summary::summarize;
use crash_map_analytics::timeseries::daily_counts;
use crash_map_analytics_models::{AreaSummary, Cluster, TimeseriesBucket};
use crash_map_crash_models::{BoundingBox, PointRecord};
use crash_map_database::{CacheStore, StorageError};
use crash_map_ingest::{
    DEFAULT_FETCH_LIMIT, DEFAULT_MAX_CACHE_AGE_HOURS, DEFAULT_WINDOW_DAYS, IngestError, is_stale,
    refresh,
};
use crash_map_server_models::{AreaQueryParams, CrashQueryParams, HotspotQueryParams};
use crash_map_source::{CrashSource, FetchOptions};

/// Default number of hotspot clusters.
pub const DEFAULT_K: i64 = 20;

/// Largest accepted hotspot cluster count.
pub const MAX_K: i64 = 200;

/// Largest accepted result limit.
pub const MAX_LIMIT: i64 = 50_000;

/// Default point-mode radius in meters.
pub const DEFAULT_RADIUS_M: f64 = 250.0;

/// Largest accepted point-mode radius in meters.
pub const MAX_RADIUS_M: f64 = 1000.0;

/// Errors returned by [`QueryEngine`] operations.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// A query parameter is missing or out of range.
    #[error("{0}")]
    Validation(String),

    /// The cache needed a refresh, the refresh failed, and there is no
    /// previous cache to fall back to.
    #[error("Ingestion failed: {0}")]
    Ingestion(IngestError),

    /// Reading or writing the local cache failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An aggregation rejected its input.
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

/// Tuning for refreshes and staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Days of history fetched per refresh and covered by timeseries.
    pub window_days: u32,
    /// Maximum number of records fetched per refresh.
    pub fetch_limit: u64,
    /// Age after which the cache is refreshed before answering.
    pub max_cache_age: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            max_cache_age: chrono::Duration::hours(DEFAULT_MAX_CACHE_AGE_HOURS),
        }
    }
}

/// A query answer plus whether it was served from a cache that could not
/// be refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult<T> {
    /// The answer.
    pub value: T,
    /// `true` if a needed refresh failed and older cached data was used.
    pub stale: bool,
}

impl<T> QueryResult<T> {
    /// Transforms the value, keeping the staleness flag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        QueryResult {
            value: f(self.value),
            stale: self.stale,
        }
    }
}

/// A validated spatial selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Area {
    /// Points inside a bounding box.
    Bbox(BoundingBox),
    /// Points within `radius_m` meters of a center point.
    Radius {
        /// Center longitude.
        longitude: f64,
        /// Center latitude.
        latitude: f64,
        /// Radius in meters.
        radius_m: f64,
    },
}

/// Validates an optional hour-of-day filter.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] if the hour is outside 0-23.
pub fn validate_hour(hour: Option<i64>) -> Result<Option<u8>, QueryError> {
    hour.map(|h| {
        u8::try_from(h)
            .ok()
            .filter(|h| *h <= 23)
            .ok_or_else(|| QueryError::Validation(format!("hour must be 0-23, got {h}")))
    })
    .transpose()
}

/// Validates a result limit, defaulting to [`DEFAULT_FETCH_LIMIT`].
///
/// # Errors
///
/// Returns [`QueryError::Validation`] if the limit is outside
/// `1..=MAX_LIMIT`.
pub fn validate_limit(limit: Option<i64>) -> Result<usize, QueryError> {
    let limit = limit.unwrap_or_else(|| i64::try_from(DEFAULT_FETCH_LIMIT).unwrap_or(MAX_LIMIT));
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(QueryError::Validation(format!(
            "limit must be 1-{MAX_LIMIT}, got {limit}"
        )));
    }
    usize::try_from(limit)
        .map_err(|_| QueryError::Validation(format!("limit out of range: {limit}")))
}

/// Validates a hotspot cluster count, defaulting to [`DEFAULT_K`].
///
/// # Errors
///
/// Returns [`QueryError::Validation`] if `k` is outside `1..=MAX_K`.
pub fn validate_k(k: Option<i64>) -> Result<usize, QueryError> {
    let k = k.unwrap_or(DEFAULT_K);
    if !(1..=MAX_K).contains(&k) {
        return Err(QueryError::Validation(format!("k must be 1-{MAX_K}, got {k}")));
    }
    usize::try_from(k).map_err(|_| QueryError::Validation(format!("k out of range: {k}")))
}

/// Parses a bounding box string `"west,south,east,north"`.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] unless the string holds exactly four
/// finite numbers forming a box with `west < east` and `south < north`
/// inside WGS84 range.
pub fn parse_bbox(s: &str) -> Result<BoundingBox, QueryError> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| QueryError::Validation(format!("bbox must be four numbers, got {s:?}")))?;

    let [west, south, east, north] = parts[..] else {
        return Err(QueryError::Validation(format!(
            "bbox must be west,south,east,north, got {} values",
            parts.len()
        )));
    };

    let bbox = BoundingBox::new(west, south, east, north);
    if !bbox.is_valid() {
        return Err(QueryError::Validation(format!(
            "bbox is not a valid WGS84 box: {s}"
        )));
    }
    Ok(bbox)
}

/// Validates the spatial parameters shared by timeseries and summary.
///
/// # Errors
///
/// Returns [`QueryError::Validation`] for an unknown mode, a missing or
/// malformed bbox, missing or out-of-range point coordinates, or a radius
/// outside `(0, MAX_RADIUS_M]`.
pub fn parse_area(params: &AreaQueryParams) -> Result<Area, QueryError> {
    match params.mode.as_deref().unwrap_or("bbox") {
        "bbox" => {
            let bbox = params
                .bbox
                .as_deref()
                .ok_or_else(|| QueryError::Validation("bbox required".to_string()))?;
            Ok(Area::Bbox(parse_bbox(bbox)?))
        }
        "point" => {
            let (Some(longitude), Some(latitude)) = (params.lon, params.lat) else {
                return Err(QueryError::Validation(
                    "lon and lat required for point mode".to_string(),
                ));
            };
            if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
                return Err(QueryError::Validation(format!(
                    "point out of range: {longitude},{latitude}"
                )));
            }

            let radius_m = params.radius_m.unwrap_or(DEFAULT_RADIUS_M);
            if !(radius_m > 0.0 && radius_m <= MAX_RADIUS_M) {
                return Err(QueryError::Validation(format!(
                    "radius_m must be in (0, {MAX_RADIUS_M}], got {radius_m}"
                )));
            }

            Ok(Area::Radius {
                longitude,
                latitude,
                radius_m,
            })
        }
        other => Err(QueryError::Validation(format!("invalid mode: {other}"))),
    }
}

/// Whether a `refresh` parameter asks for a forced refresh.
#[must_use]
pub fn wants_refresh(refresh: Option<&str>) -> bool {
    matches!(refresh, Some("1" | "true"))
}

/// Answers crash queries for a single city from its local cache.
pub struct QueryEngine {
    store: Mutex<CacheStore>,
    source: Arc<dyn CrashSource>,
    refresh_lock: tokio::sync::Mutex<()>,
    config: EngineConfig,
}

impl QueryEngine {
    /// Creates an engine over an opened cache and its upstream source.
    #[must_use]
    pub fn new(store: CacheStore, source: Arc<dyn CrashSource>, config: EngineConfig) -> Self {
        Self {
            store: Mutex::new(store),
            source,
            refresh_lock: tokio::sync::Mutex::new(()),
            config,
        }
    }

    fn store(&self) -> MutexGuard<'_, CacheStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_refresh_time(&self) -> Result<Option<DateTime<Utc>>, QueryError> {
        Ok(self.store().last_refresh_time()?)
    }

    /// Refreshes the cache if `force` is set or it is stale.
    ///
    /// Refreshes are serialized; a request that waited on another refresh
    /// skips its own if the cache changed in the meantime. Returns `true`
    /// when the refresh failed but a previous cache is available.
    async fn ensure_fresh(&self, force: bool) -> Result<bool, QueryError> {
        let observed = self.last_refresh_time()?;
        if !force && !is_stale(observed, Utc::now(), self.config.max_cache_age) {
            return Ok(false);
        }

        let _guard = self.refresh_lock.lock().await;

        let current = self.last_refresh_time()?;
        if current != observed && !is_stale(current, Utc::now(), self.config.max_cache_age) {
            log::debug!("{}: cache refreshed by a concurrent request", self.source.id());
            return Ok(false);
        }

        let options = FetchOptions {
            days_back: self.config.window_days,
            limit: self.config.fetch_limit,
        };

        match refresh(self.source.as_ref(), &self.store, &options).await {
            Ok(_) => Ok(false),
            Err(IngestError::Storage(e)) => Err(QueryError::Storage(e)),
            Err(e) => {
                let has_cache = current.is_some() || !self.store().is_empty();
                if has_cache {
                    log::warn!("{}: serving stale cache: {e}", self.source.id());
                    Ok(true)
                } else {
                    Err(QueryError::Ingestion(e))
                }
            }
        }
    }

    fn points_in(&self, area: &Area) -> Vec<PointRecord> {
        let store = self.store();
        match *area {
            Area::Bbox(bbox) => store.query_bbox(&bbox, None),
            Area::Radius {
                longitude,
                latitude,
                radius_m,
            } => store.query_radius(longitude, latitude, radius_m, None),
        }
    }

    fn city_points(&self, hour: Option<u8>, limit: usize) -> Vec<PointRecord> {
        let mut points = self.store().query_bbox(&self.source.bounds(), hour);
        points.truncate(limit);
        points
    }

    /// Cached crashes inside the city, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for invalid parameters, or if the cache had to
    /// be refreshed and could be neither refreshed nor read.
    pub async fn crashes(
        &self,
        params: &CrashQueryParams,
    ) -> Result<QueryResult<Vec<PointRecord>>, QueryError> {
        let hour = validate_hour(params.hour)?;
        let limit = validate_limit(params.limit)?;
        let stale = self
            .ensure_fresh(wants_refresh(params.refresh.as_deref()))
            .await?;

        let value = self.city_points(hour, limit);
        log::debug!("crashes: {} points (hour={hour:?})", value.len());
        Ok(QueryResult { value, stale })
    }

    /// Hotspot clusters over the city's cached crashes.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for invalid parameters, or if the cache had to
    /// be refreshed and could be neither refreshed nor read.
    pub async fn hotspots(
        &self,
        params: &HotspotQueryParams,
    ) -> Result<QueryResult<Vec<Cluster>>, QueryError> {
        let k = validate_k(params.k)?;
        let hour = validate_hour(params.hour)?;
        let limit = validate_limit(params.limit)?;
        let stale = self
            .ensure_fresh(wants_refresh(params.refresh.as_deref()))
            .await?;

        let points = self.city_points(hour, limit);
        let value = compute_hotspots(&points, k, hour)?;
        log::debug!(
            "hotspots: {} clusters from {} points (k={k}, hour={hour:?})",
            value.len(),
            points.len()
        );
        Ok(QueryResult { value, stale })
    }

    /// Daily crash counts inside an area over the trailing window ending
    /// today (UTC).
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for invalid parameters, or if the cache had to
    /// be refreshed and could be neither refreshed nor read.
    pub async fn timeseries(
        &self,
        params: &AreaQueryParams,
    ) -> Result<QueryResult<Vec<TimeseriesBucket>>, QueryError> {
        let area = parse_area(params)?;
        let stale = self
            .ensure_fresh(wants_refresh(params.refresh.as_deref()))
            .await?;

        let points = self.points_in(&area);
        let value = daily_counts(&points, Utc::now().date_naive(), self.config.window_days);
        Ok(QueryResult { value, stale })
    }

    /// Severity histogram and date range of the crashes inside an area.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] for invalid parameters, or if the cache had to
    /// be refreshed and could be neither refreshed nor read.
    pub async fn summary(
        &self,
        params: &AreaQueryParams,
    ) -> Result<QueryResult<AreaSummary>, QueryError> {
        let area = parse_area(params)?;
        let stale = self
            .ensure_fresh(wants_refresh(params.refresh.as_deref()))
            .await?;

        let points = self.points_in(&area);
        Ok(QueryResult {
            value: summarize(&points),
            stale,
        })
    }
}
