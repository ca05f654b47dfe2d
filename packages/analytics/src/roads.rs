//! Nearest-road assignment and per-road crash risk scoring.
//!
//! Roads are indexed by their bounding boxes in the same R-tree the crash
//! cache uses. Each crash looks up the roads whose boxes meet its search
//! radius envelope and is snapped to the closest one, measured in a local
//! metric projection centered on the crash.

use std::collections::HashMap;

use crash_map_analytics_models::{Road, RoadAssignment, RoadSummary};
use crash_map_crash_models::{BoundingBox, PointRecord};
use crash_map_spatial::{EARTH_RADIUS_M, PointIndex, radius_envelopes};
use geo::{Distance as _, Euclidean, Haversine, Length as _, LineString, Point};

/// Crashes further than this from every road stay unassigned.
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 80.0;

/// Weight of severity per kilometer in the risk score.
pub const SEVERITY_WEIGHT: f64 = 0.6;

/// Weight of crash count per kilometer in the risk score.
pub const COUNT_WEIGHT: f64 = 0.4;

/// Great-circle length of a `[longitude, latitude]` path in meters.
#[must_use]
pub fn path_length_m(path: &[[f64; 2]]) -> f64 {
    Haversine.length(&LineString::from(path.to_vec()))
}

/// Whether a road path can be measured and indexed: at least two vertices,
/// all finite.
pub(crate) fn is_usable_path(path: &[[f64; 2]]) -> bool {
    path.len() >= 2 && path.iter().flatten().all(|v| v.is_finite())
}

fn path_bbox(path: &[[f64; 2]]) -> BoundingBox {
    path.iter().fold(
        BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |acc, [lon, lat]| {
            BoundingBox::new(
                acc.west.min(*lon),
                acc.south.min(*lat),
                acc.east.max(*lon),
                acc.north.max(*lat),
            )
        },
    )
}

/// Distance in meters from `(longitude, latitude)` to the polyline `path`,
/// using an equirectangular projection centered on the point.
fn distance_to_path_m(longitude: f64, latitude: f64, path: &[[f64; 2]]) -> f64 {
    let meters_per_lon_rad = EARTH_RADIUS_M * latitude.to_radians().cos();
    let projected: Vec<[f64; 2]> = path
        .iter()
        .map(|[lon, lat]| {
            let dlon = (lon - longitude + 540.0).rem_euclid(360.0) - 180.0;
            [
                dlon.to_radians() * meters_per_lon_rad,
                (lat - latitude).to_radians() * EARTH_RADIUS_M,
            ]
        })
        .collect();

    Euclidean.distance(&Point::new(0.0, 0.0), &LineString::from(projected))
}

/// Snaps every crash to its nearest road within `search_radius_m` meters.
///
/// Assignments come back in crash order. Roads with unusable paths are
/// never matched. When two roads are equally close the one listed first
/// wins.
#[must_use]
pub fn assign_nearest_roads(
    crashes: &[PointRecord],
    roads: &[Road],
    search_radius_m: f64,
) -> Vec<RoadAssignment> {
    let usable: Vec<&Road> = roads.iter().filter(|r| is_usable_path(&r.path)).collect();
    let boxes: Vec<BoundingBox> = usable.iter().map(|r| path_bbox(&r.path)).collect();
    let index = PointIndex::build(&boxes);

    let assignments: Vec<RoadAssignment> = crashes
        .iter()
        .map(|crash| {
            let envelopes = radius_envelopes(crash.longitude, crash.latitude, search_radius_m);
            let nearest = index
                .candidates_any(&envelopes)
                .into_iter()
                .map(|slot| {
                    let road = usable[slot];
                    let d = distance_to_path_m(crash.longitude, crash.latitude, &road.path);
                    (road.road_id, d)
                })
                .filter(|(_, d)| *d <= search_radius_m)
                .fold(None, |best: Option<(u64, f64)>, (id, d)| match best {
                    Some((_, best_d)) if best_d <= d => best,
                    _ => Some((id, d)),
                });

            RoadAssignment {
                crash_id: crash.id.clone(),
                severity: crash.severity.value(),
                road_id: nearest.map(|(id, _)| id),
                distance_m: nearest.map(|(_, d)| d),
            }
        })
        .collect();

    log::debug!(
        "Assigned {} of {} crashes to {} roads",
        assignments.iter().filter(|a| a.road_id.is_some()).count(),
        crashes.len(),
        usable.len()
    );

    assignments
}

/// Aggregates assigned crashes per road and scores each road.
///
/// Every road appears once, in input order, including roads with no
/// crashes. Per-kilometer rates are `0.0` for roads with no length.
#[must_use]
pub fn road_summary(roads: &[Road], assignments: &[RoadAssignment]) -> Vec<RoadSummary> {
    let mut totals: HashMap<u64, (u64, u64)> = HashMap::new();
    for assignment in assignments {
        if let Some(road_id) = assignment.road_id {
            let entry = totals.entry(road_id).or_default();
            entry.0 += 1;
            entry.1 += u64::from(assignment.severity);
        }
    }

    roads
        .iter()
        .map(|road| {
            let (n_crashes, sev_sum) = totals.get(&road.road_id).copied().unwrap_or_default();
            let km = road.length_m / 1000.0;
            #[allow(clippy::cast_precision_loss)]
            let per_km = |value: u64| {
                if km > 0.0 && km.is_finite() {
                    value as f64 / km
                } else {
                    0.0
                }
            };
            let crashes_per_km = per_km(n_crashes);
            let sev_per_km = per_km(sev_sum);

            RoadSummary {
                road: road.clone(),
                n_crashes,
                sev_sum,
                crashes_per_km,
                sev_per_km,
                risk_score: SEVERITY_WEIGHT.mul_add(sev_per_km, COUNT_WEIGHT * crashes_per_km),
            }
        })
        .collect()
}
