//! Geometry quality checks for road and crash layers.

use crash_map_analytics_models::{QaqcReport, Road};
use crash_map_crash_models::{CacheEntry, wkt};

/// Coordinates further apart than this (degrees) count as disagreeing.
const COORD_TOLERANCE: f64 = 1e-9;

fn in_range(longitude: f64, latitude: f64) -> bool {
    (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude)
}

/// A road is invalid when it has a non-finite or out-of-range vertex, or
/// fewer than two distinct vertices.
fn road_is_invalid(road: &Road) -> bool {
    if !crate::roads::is_usable_path(&road.path)
        || !road.path.iter().all(|[lon, lat]| in_range(*lon, *lat))
    {
        return true;
    }
    road.path.iter().all(|v| v == &road.path[0])
}

/// A crash is invalid when its stored WKT does not parse as a point, lies
/// out of range, or disagrees with the record's coordinates.
fn crash_is_invalid(entry: &CacheEntry) -> bool {
    wkt::parse_point_wkt(&entry.wkt).is_none_or(|(lon, lat)| {
        !in_range(lon, lat)
            || (lon - entry.record.longitude).abs() > COORD_TOLERANCE
            || (lat - entry.record.latitude).abs() > COORD_TOLERANCE
    })
}

/// Counts missing and invalid geometries in a road layer and a crash layer.
///
/// Null geometries (an empty road path, a blank crash WKT) are counted
/// only as null, never also as invalid.
#[must_use]
pub fn run_qaqc(roads: &[Road], crashes: &[CacheEntry]) -> QaqcReport {
    let mut report = QaqcReport {
        roads_total: roads.len() as u64,
        crashes_total: crashes.len() as u64,
        ..QaqcReport::default()
    };

    for road in roads {
        if road.path.is_empty() {
            report.roads_null_geom += 1;
        } else if road_is_invalid(road) {
            report.roads_invalid += 1;
        }
    }

    for entry in crashes {
        if entry.wkt.trim().is_empty() {
            report.crashes_null_geom += 1;
        } else if crash_is_invalid(entry) {
            report.crashes_invalid += 1;
        }
    }

    if report.has_issues() {
        log::warn!("QA/QC found geometry issues: {report:?}");
    } else {
        log::debug!(
            "QA/QC clean: {} roads, {} crashes",
            report.roads_total,
            report.crashes_total
        );
    }

    report
}
