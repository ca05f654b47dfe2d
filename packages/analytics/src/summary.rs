//! Severity and date summary of the crashes inside an area.

use std::collections::BTreeMap;

use crash_map_analytics_models::AreaSummary;
use crash_map_crash_models::{CrashSeverity, PointRecord};

/// Summarizes a spatially filtered point set.
#[must_use]
pub fn summarize(points: &[PointRecord]) -> AreaSummary {
    let mut severity_hist: BTreeMap<String, u64> = CrashSeverity::all()
        .iter()
        .map(|s| (s.value().to_string(), 0))
        .collect();

    let mut severity_total = 0u64;
    for point in points {
        *severity_hist
            .entry(point.severity.value().to_string())
            .or_default() += 1;
        severity_total += u64::from(point.severity.value());
    }

    let total = points.len() as u64;
    let avg_severity = if total == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let mean = severity_total as f64 / total as f64;
        (mean * 100.0).round() / 100.0
    };

    AreaSummary {
        severity_hist,
        total,
        avg_severity,
        min_date: points.iter().map(PointRecord::date).min(),
        max_date: points.iter().map(PointRecord::date).max(),
    }
}
