#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the crash map server.
//!
//! Query parameter structs are deserialized loosely (numbers as `i64`,
//! flags as strings) so that out-of-range values reach the query engine
//! and get a descriptive validation error instead of a generic parse
//! failure. Point and hotspot responses are GeoJSON `FeatureCollection`s,
//! as are the road layers written by the batch pipeline.

use crash_map_analytics_models::{Cluster, Road, RoadSummary};
use crash_map_crash_models::{BoundingBox, PointRecord};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::{Deserialize, Serialize};

/// Query parameters for the crashes endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrashQueryParams {
    /// Maximum number of features returned.
    pub limit: Option<i64>,
    /// Hour-of-day filter (0-23).
    pub hour: Option<i64>,
    /// `1` or `true` forces a cache refresh before querying.
    pub refresh: Option<String>,
}

/// Query parameters for the hotspots endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HotspotQueryParams {
    /// Number of clusters requested.
    pub k: Option<i64>,
    /// Hour-of-day filter (0-23).
    pub hour: Option<i64>,
    /// Maximum number of points fed to clustering.
    pub limit: Option<i64>,
    /// `1` or `true` forces a cache refresh before querying.
    pub refresh: Option<String>,
}

/// Spatial selection shared by the timeseries and summary endpoints.
///
/// `mode=bbox` requires `bbox`; `mode=point` requires `lon` and `lat` and
/// takes an optional `radius_m`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AreaQueryParams {
    /// `bbox` (default) or `point`.
    pub mode: Option<String>,
    /// Bounding box as `west,south,east,north`.
    pub bbox: Option<String>,
    /// Center longitude for point mode.
    pub lon: Option<f64>,
    /// Center latitude for point mode.
    pub lat: Option<f64>,
    /// Radius in meters for point mode.
    pub radius_m: Option<f64>,
    /// `1` or `true` forces a cache refresh before querying.
    pub refresh: Option<String>,
}

/// A configured city as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSource {
    /// Source identifier (e.g., `"nyc"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// City name.
    pub city: String,
    /// State abbreviation.
    pub state: String,
    /// Coverage area.
    pub bounds: BoundingBox,
}

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

fn point_geometry(longitude: f64, latitude: f64) -> Geometry {
    Geometry::new(Value::Point(vec![longitude, latitude]))
}

fn line_geometry(path: &[[f64; 2]]) -> Geometry {
    Geometry::new(Value::LineString(
        path.iter().map(|[lon, lat]| vec![*lon, *lat]).collect(),
    ))
}

fn road_properties(road: &Road) -> JsonObject {
    let mut properties = JsonObject::new();
    properties.insert("roadId".to_string(), road.road_id.into());
    properties.insert("class".to_string(), road.class.as_str().into());
    properties.insert("lengthM".to_string(), road.length_m.into());
    properties
}

fn road_feature(road: &Road, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(line_geometry(&road.path)),
        id: Some(geojson::feature::Id::Number(road.road_id.into())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Converts cached crash records into a GeoJSON `FeatureCollection` of
/// points, preserving input order.
#[must_use]
pub fn crashes_to_feature_collection(records: &[PointRecord]) -> FeatureCollection {
    let features = records
        .iter()
        .map(|record| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), record.id.clone().into());
            properties.insert(
                "timestamp".to_string(),
                record.occurred_at.to_rfc3339().into(),
            );
            properties.insert("date".to_string(), record.date().to_string().into());
            properties.insert("hour".to_string(), record.hour.into());
            properties.insert("severity".to_string(), record.severity.value().into());
            properties.insert(
                "attributes".to_string(),
                serde_json::Value::Object(record.attributes.clone().into_iter().collect()),
            );

            Feature {
                bbox: None,
                geometry: Some(point_geometry(record.longitude, record.latitude)),
                id: Some(geojson::feature::Id::String(record.id.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Converts hotspot clusters into a GeoJSON `FeatureCollection` of their
/// centers. `rank` is 1-based in input order.
#[must_use]
pub fn clusters_to_feature_collection(clusters: &[Cluster]) -> FeatureCollection {
    let features = clusters
        .iter()
        .enumerate()
        .map(|(i, cluster)| {
            let mut properties = JsonObject::new();
            properties.insert("rank".to_string(), (i + 1).into());
            properties.insert("count".to_string(), cluster.count.into());
            properties.insert("severityMean".to_string(), cluster.severity_mean.into());
            properties.insert("hour".to_string(), cluster.hour_filter.into());

            Feature {
                bbox: None,
                geometry: Some(point_geometry(cluster.longitude, cluster.latitude)),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Converts roads into a GeoJSON `FeatureCollection` of line strings.
#[must_use]
pub fn roads_to_feature_collection(roads: &[Road]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: roads
            .iter()
            .map(|road| road_feature(road, road_properties(road)))
            .collect(),
        foreign_members: None,
    }
}

/// Converts scored roads into a GeoJSON `FeatureCollection` of line
/// strings carrying the road attributes plus crash totals and risk.
#[must_use]
pub fn road_summaries_to_feature_collection(summaries: &[RoadSummary]) -> FeatureCollection {
    let features = summaries
        .iter()
        .map(|summary| {
            let mut properties = road_properties(&summary.road);
            properties.insert("nCrashes".to_string(), summary.n_crashes.into());
            properties.insert("sevSum".to_string(), summary.sev_sum.into());
            properties.insert("crashesPerKm".to_string(), summary.crashes_per_km.into());
            properties.insert("sevPerKm".to_string(), summary.sev_per_km.into());
            properties.insert("riskScore".to_string(), summary.risk_score.into());
            road_feature(&summary.road, properties)
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
