#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crash point records and the geometry types used to cache them.
//!
//! Every data source normalizes its rows into [`PointRecord`]s. The cache
//! store wraps each record in a [`CacheEntry`] carrying the WKT geometry and
//! the degenerate point [`BoundingBox`] fed to the spatial index.

pub mod wkt;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Timelike as _, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Open-ended attribute payload carried through from the upstream source.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Severity proxy for a crash, from 1 (no casualties) to 5 (fatal).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CrashSeverity {
    /// Level 1: property damage only
    Minimal = 1,
    /// Level 2: a single injury
    Low = 2,
    /// Level 3: two injuries
    Moderate = 3,
    /// Level 4: three injuries
    High = 4,
    /// Level 5: four or more injuries, or any fatality
    Critical = 5,
}

impl CrashSeverity {
    /// Returns the numeric value of this severity level.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Creates a severity level from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-5.
    pub const fn from_value(value: u8) -> Result<Self, InvalidSeverityError> {
        match value {
            1 => Ok(Self::Minimal),
            2 => Ok(Self::Low),
            3 => Ok(Self::Moderate),
            4 => Ok(Self::High),
            5 => Ok(Self::Critical),
            _ => Err(InvalidSeverityError { value }),
        }
    }

    /// Derives the severity from casualty counts: `1 + injured + 5 * killed`,
    /// clamped to 1-5.
    #[must_use]
    pub fn from_casualties(injured: u32, killed: u32) -> Self {
        let score = 1u64 + u64::from(injured) + 5 * u64::from(killed);
        let clamped = u8::try_from(score.clamp(1, 5)).unwrap_or(5);
        Self::from_value(clamped).unwrap_or(Self::Critical)
    }

    /// Returns all variants of this enum, least severe first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Minimal,
            Self::Low,
            Self::Moderate,
            Self::High,
            Self::Critical,
        ]
    }
}

/// Error returned when attempting to create a [`CrashSeverity`] from an
/// invalid numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSeverityError {
    /// The invalid severity value that was provided.
    pub value: u8,
}

impl std::fmt::Display for InvalidSeverityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid severity value {}: expected 1-5", self.value)
    }
}

impl std::error::Error for InvalidSeverityError {}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western longitude boundary (minlon).
    pub west: f64,
    /// Southern latitude boundary (minlat).
    pub south: f64,
    /// Eastern longitude boundary (maxlon).
    pub east: f64,
    /// Northern latitude boundary (maxlat).
    pub north: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Creates the degenerate box `(lon, lat, lon, lat)` for a single point.
    #[must_use]
    pub const fn from_point(longitude: f64, latitude: f64) -> Self {
        Self::new(longitude, latitude, longitude, latitude)
    }

    /// Whether the point lies inside the box. All four edges are inclusive.
    #[must_use]
    pub fn contains(&self, longitude: f64, latitude: f64) -> bool {
        longitude >= self.west
            && longitude <= self.east
            && latitude >= self.south
            && latitude <= self.north
    }

    /// Whether the box is finite, strictly ordered, and inside WGS84 range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let finite = [self.west, self.south, self.east, self.north]
            .iter()
            .all(|v| v.is_finite());

        finite
            && self.west < self.east
            && self.south < self.north
            && self.west >= -180.0
            && self.east <= 180.0
            && self.south >= -90.0
            && self.north <= 90.0
    }
}

/// A crash normalized to the canonical point shape.
///
/// `hour` is always derived from `occurred_at`; construct records through
/// [`PointRecord::new`] so the two never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointRecord {
    /// Stable external identifier from the data source.
    pub id: String,
    /// When the crash occurred, in the canonical timezone.
    pub occurred_at: DateTime<Utc>,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Hour of day (0-23) derived from `occurred_at`.
    pub hour: u8,
    /// Severity proxy derived from casualty counts.
    pub severity: CrashSeverity,
    /// Additional upstream fields that have no fixed slot.
    #[serde(default)]
    pub attributes: Attributes,
}

impl PointRecord {
    /// Creates a record, deriving `hour` from `occurred_at`.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        longitude: f64,
        latitude: f64,
        severity: CrashSeverity,
        attributes: Attributes,
    ) -> Self {
        let hour = u8::try_from(occurred_at.hour()).unwrap_or(0);
        Self {
            id: id.into(),
            occurred_at,
            longitude,
            latitude,
            hour,
            severity,
            attributes,
        }
    }

    /// Calendar day of the crash in the canonical timezone.
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.occurred_at.date_naive()
    }
}

/// A cached record together with its stored geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cached record.
    pub record: PointRecord,
    /// WKT geometry, always `POINT(lon lat)`.
    pub wkt: String,
    /// Bounding box used by the spatial index.
    pub bbox: BoundingBox,
}

impl CacheEntry {
    /// Wraps a record, computing its WKT and degenerate point bounding box.
    #[must_use]
    pub fn new(record: PointRecord) -> Self {
        let wkt = wkt::point_wkt(record.longitude, record.latitude);
        let bbox = BoundingBox::from_point(record.longitude, record.latitude);
        Self { record, wkt, bbox }
    }
}
