#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types produced by the hotspot, timeseries, and summary engines,
//! plus the road network types used by the batch road risk pipeline.
//!
//! Query results are derived on demand from cached points and never
//! persisted.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A hotspot: the center of a k-means cluster of crash points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Centroid longitude (WGS84).
    pub longitude: f64,
    /// Centroid latitude (WGS84).
    pub latitude: f64,
    /// Number of points assigned to this cluster. Always at least 1.
    pub count: u64,
    /// Mean severity (1-5) of the assigned points.
    pub severity_mean: f64,
    /// The hour-of-day filter the cluster was computed under, if any.
    pub hour_filter: Option<u8>,
}

/// Crash count for a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeseriesBucket {
    /// The day, in the canonical timezone.
    pub date: NaiveDate,
    /// Number of crashes on that day.
    pub count: u64,
}

/// Aggregate statistics for the crashes inside an area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSummary {
    /// Counts per severity level, keyed `"1"` through `"5"`. Every level is
    /// present, zero-filled.
    pub severity_hist: BTreeMap<String, u64>,
    /// Total crash count.
    pub total: u64,
    /// Mean severity rounded to two decimals, `0.0` when empty.
    pub avg_severity: f64,
    /// Earliest crash date, if any.
    pub min_date: Option<NaiveDate>,
    /// Latest crash date, if any.
    pub max_date: Option<NaiveDate>,
}

/// Functional class of a road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoadClass {
    /// Major through road.
    Arterial,
    /// Minor road feeding arterials.
    Collector,
}

impl RoadClass {
    /// Lowercase name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arterial => "arterial",
            Self::Collector => "collector",
        }
    }
}

/// A road segment as a WGS84 polyline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Road {
    /// Unique road identifier.
    pub road_id: u64,
    /// Functional class.
    pub class: RoadClass,
    /// Vertices as `[longitude, latitude]` pairs.
    pub path: Vec<[f64; 2]>,
    /// Great-circle length of the path in meters.
    pub length_m: f64,
}

/// The road a crash was snapped to, if any road was within the search
/// radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadAssignment {
    /// Id of the assigned crash.
    pub crash_id: String,
    /// Severity (1-5) of the crash.
    pub severity: u8,
    /// Nearest road, `None` when nothing is within range.
    pub road_id: Option<u64>,
    /// Distance to the nearest road in meters.
    pub distance_m: Option<f64>,
}

/// Crash totals and risk score for a single road.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadSummary {
    /// The scored road.
    pub road: Road,
    /// Crashes assigned to the road.
    pub n_crashes: u64,
    /// Sum of the assigned crashes' severities.
    pub sev_sum: u64,
    /// Crashes per kilometer of road, `0.0` for zero-length roads.
    pub crashes_per_km: f64,
    /// Severity sum per kilometer of road, `0.0` for zero-length roads.
    pub sev_per_km: f64,
    /// `0.6 * sev_per_km + 0.4 * crashes_per_km`.
    pub risk_score: f64,
}

/// Geometry quality counts for a road layer and a crash layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaqcReport {
    pub roads_total: u64,
    /// Roads with no vertices.
    pub roads_null_geom: u64,
    /// Roads whose path is not a usable line.
    pub roads_invalid: u64,
    pub crashes_total: u64,
    /// Crashes with an empty stored geometry.
    pub crashes_null_geom: u64,
    /// Crashes whose stored geometry is malformed or out of range.
    pub crashes_invalid: u64,
}

impl QaqcReport {
    /// Whether any geometry issue was found.
    #[must_use]
    pub const fn has_issues(&self) -> bool {
        self.roads_null_geom
            + self.roads_invalid
            + self.crashes_null_geom
            + self.crashes_invalid
            > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_serializes_iso_date() {
        let bucket = TimeseriesBucket {
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            count: 7,
        };
        assert_eq!(
            serde_json::to_value(bucket).unwrap(),
            serde_json::json!({"date": "2025-03-04", "count": 7})
        );
    }

    #[test]
    fn cluster_serializes_camel_case() {
        let cluster = Cluster {
            longitude: -73.98,
            latitude: 40.75,
            count: 3,
            severity_mean: 1.5,
            hour_filter: None,
        };
        let value = serde_json::to_value(&cluster).unwrap();
        assert_eq!(value["severityMean"], serde_json::json!(1.5));
        assert!(value["hourFilter"].is_null());
    }

    #[test]
    fn road_class_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(RoadClass::Arterial).unwrap(),
            serde_json::json!("arterial")
        );
        assert_eq!(RoadClass::Collector.as_str(), "collector");
    }

    #[test]
    fn clean_report_has_no_issues() {
        let mut report = QaqcReport {
            roads_total: 4,
            crashes_total: 10,
            ..QaqcReport::default()
        };
        assert!(!report.has_issues());
        report.crashes_invalid = 1;
        assert!(report.has_issues());
    }
}
