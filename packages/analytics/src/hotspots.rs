//! K-means hotspot clustering over crash locations.
//!
//! Lloyd's algorithm on the `(longitude, latitude)` plane with Euclidean
//! distance in degrees, which is close enough at city scale. Initial
//! centroids are distinct input points drawn with a fixed-seed RNG so the
//! same cache contents always yield the same hotspots.

use crash_map_analytics_models::Cluster;
use crash_map_crash_models::PointRecord;
use rand::SeedableRng as _;
use rand_chacha::ChaCha8Rng;

use crate::AnalyticsError;

/// Seed for centroid initialization.
pub const HOTSPOT_SEED: u64 = 42;

/// Maximum Lloyd iterations.
pub const MAX_ITERATIONS: usize = 100;

/// Clustering stops early once no centroid moves further than this (degrees).
pub const CONVERGENCE_TOLERANCE: f64 = 1e-9;

/// Partitions `points` into at most `k` clusters and returns their centers,
/// largest first.
///
/// `points` are expected to be filtered already; `hour_filter` is only
/// recorded on each cluster. If there are fewer points than `k`, the
/// effective cluster count shrinks to the point count. Clusters that end up
/// with no members are dropped, so duplicate locations never produce
/// zero-count hotspots.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidClusterCount`] if `k` is zero.
pub fn compute_hotspots(
    points: &[PointRecord],
    k: usize,
    hour_filter: Option<u8>,
) -> Result<Vec<Cluster>, AnalyticsError> {
    if k == 0 {
        return Err(AnalyticsError::InvalidClusterCount { k });
    }
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let coords: Vec<[f64; 2]> = points.iter().map(|p| [p.longitude, p.latitude]).collect();
    let k = k.min(coords.len());

    let mut rng = ChaCha8Rng::seed_from_u64(HOTSPOT_SEED);
    let mut centers: Vec<[f64; 2]> = rand::seq::index::sample(&mut rng, coords.len(), k)
        .into_iter()
        .map(|i| coords[i])
        .collect();

    let mut assignments = vec![0usize; coords.len()];
    let mut iterations = 0;

    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        assign(&coords, &centers, &mut assignments);

        let mut sums = vec![[0.0, 0.0]; k];
        let mut counts = vec![0usize; k];
        for (c, &cluster) in coords.iter().zip(&assignments) {
            sums[cluster][0] += c[0];
            sums[cluster][1] += c[1];
            counts[cluster] += 1;
        }

        let mut max_shift: f64 = 0.0;
        for (j, center) in centers.iter_mut().enumerate() {
            // Empty clusters keep their center and are dropped at the end
            if counts[j] == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let n = counts[j] as f64;
            let next = [sums[j][0] / n, sums[j][1] / n];
            max_shift = max_shift
                .max((next[0] - center[0]).abs())
                .max((next[1] - center[1]).abs());
            *center = next;
        }

        if max_shift <= CONVERGENCE_TOLERANCE {
            break;
        }
    }

    // Final assignment against the settled centers
    assign(&coords, &centers, &mut assignments);

    let mut counts = vec![0u64; k];
    let mut severity_sums = vec![0u64; k];
    for (point, &cluster) in points.iter().zip(&assignments) {
        counts[cluster] += 1;
        severity_sums[cluster] += u64::from(point.severity.value());
    }

    let mut clusters: Vec<Cluster> = centers
        .iter()
        .enumerate()
        .filter(|(j, _)| counts[*j] > 0)
        .map(|(j, center)| {
            #[allow(clippy::cast_precision_loss)]
            let severity_mean = severity_sums[j] as f64 / counts[j] as f64;
            Cluster {
                longitude: center[0],
                latitude: center[1],
                count: counts[j],
                severity_mean,
                hour_filter,
            }
        })
        .collect();

    clusters.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.longitude.total_cmp(&b.longitude))
            .then_with(|| a.latitude.total_cmp(&b.latitude))
    });

    log::debug!(
        "Clustered {} points into {} hotspots (k={k}, {iterations} iterations)",
        points.len(),
        clusters.len()
    );

    Ok(clusters)
}

/// Assigns each coordinate to its nearest center. Ties go to the lowest
/// center index.
fn assign(coords: &[[f64; 2]], centers: &[[f64; 2]], assignments: &mut [usize]) {
    for (c, slot) in coords.iter().zip(assignments.iter_mut()) {
        let mut best_cluster = 0;
        let mut best_dist = f64::INFINITY;
        for (j, ctr) in centers.iter().enumerate() {
            let dist = (c[0] - ctr[0]).powi(2) + (c[1] - ctr[1]).powi(2);
            if dist < best_dist {
                best_dist = dist;
                best_cluster = j;
            }
        }
        *slot = best_cluster;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use crash_map_crash_models::{Attributes, CrashSeverity};

    use super::*;

    fn point(id: usize, lon: f64, lat: f64, severity: CrashSeverity) -> PointRecord {
        PointRecord::new(
            id.to_string(),
            Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap(),
            lon,
            lat,
            severity,
            Attributes::new(),
        )
    }

    /// Three tight groups of 10, 6 and 3 points.
    fn grouped() -> Vec<PointRecord> {
        let mut points = Vec::new();
        let groups = [
            ((-73.98, 40.75), 10, CrashSeverity::Minimal),
            ((-73.90, 40.68), 6, CrashSeverity::Critical),
            ((-74.10, 40.60), 3, CrashSeverity::Low),
        ];
        for ((lon, lat), n, severity) in groups {
            for i in 0..n {
                #[allow(clippy::cast_precision_loss)]
                let jitter = i as f64 * 1e-4;
                points.push(point(points.len(), lon + jitter, lat - jitter, severity));
            }
        }
        points
    }

    #[test]
    fn rejects_zero_clusters() {
        assert_eq!(
            compute_hotspots(&grouped(), 0, None),
            Err(AnalyticsError::InvalidClusterCount { k: 0 })
        );
    }

    #[test]
    fn empty_input_yields_no_clusters() {
        assert!(compute_hotspots(&[], 5, Some(3)).unwrap().is_empty());
    }

    #[test]
    fn is_deterministic() {
        let points = grouped();
        let first = compute_hotspots(&points, 3, None).unwrap();
        let second = compute_hotspots(&points, 3, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn more_clusters_than_distinct_points() {
        let points = vec![
            point(0, -73.98, 40.75, CrashSeverity::Minimal),
            point(1, -73.90, 40.68, CrashSeverity::Minimal),
            point(2, -74.10, 40.60, CrashSeverity::Minimal),
        ];
        let clusters = compute_hotspots(&points, 5, None).unwrap();
        assert!(clusters.len() <= 3);
        assert!(clusters.iter().all(|c| c.count > 0));
        assert_eq!(clusters.iter().map(|c| c.count).sum::<u64>(), 3);
    }

    #[test]
    fn duplicate_locations_drop_empty_clusters() {
        let points: Vec<PointRecord> = (0..4)
            .map(|i| point(i, -73.98, 40.75, CrashSeverity::Low))
            .collect();
        let clusters = compute_hotspots(&points, 3, None).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 4);
    }

    #[test]
    fn separates_two_groups_sorted_by_count() {
        let points: Vec<PointRecord> = grouped().into_iter().take(16).collect();
        let clusters = compute_hotspots(&points, 2, Some(14)).unwrap();

        let counts: Vec<u64> = clusters.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![10, 6]);
        assert!((clusters[0].longitude - -73.98).abs() < 0.01);
        assert!((clusters[0].severity_mean - 1.0).abs() < f64::EPSILON);
        assert!((clusters[1].severity_mean - 5.0).abs() < f64::EPSILON);
        assert!(clusters.iter().all(|c| c.hour_filter == Some(14)));
    }

    #[test]
    fn single_cluster_center_is_mean() {
        let points = vec![
            point(0, -74.0, 40.0, CrashSeverity::Minimal),
            point(1, -73.0, 41.0, CrashSeverity::Critical),
        ];
        let clusters = compute_hotspots(&points, 1, None).unwrap();
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].longitude - -73.5).abs() < 1e-12);
        assert!((clusters[0].latitude - 40.5).abs() < 1e-12);
        assert!((clusters[0].severity_mean - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn counts_sum_to_input_size() {
        let points = grouped();
        for k in 1..=8 {
            let clusters = compute_hotspots(&points, k, None).unwrap();
            assert!(clusters.len() <= k);
            assert_eq!(
                clusters.iter().map(|c| c.count).sum::<u64>(),
                points.len() as u64
            );
            assert!(clusters.windows(2).all(|w| w[0].count >= w[1].count));
        }
    }
}
