//! Daily crash counts over a trailing window.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use crash_map_analytics_models::TimeseriesBucket;
use crash_map_crash_models::PointRecord;

/// Default trailing window length in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Buckets `points` by calendar day over the `window_days` days ending at
/// `end` (inclusive).
///
/// Always returns exactly `window_days` consecutive buckets, oldest first,
/// with zero counts for days without crashes. Points outside the window
/// are ignored.
#[must_use]
pub fn daily_counts(
    points: &[PointRecord],
    end: NaiveDate,
    window_days: u32,
) -> Vec<TimeseriesBucket> {
    if window_days == 0 {
        return Vec::new();
    }

    let start = end
        .checked_sub_days(Days::new(u64::from(window_days - 1)))
        .unwrap_or(NaiveDate::MIN);

    let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for date in points.iter().map(PointRecord::date) {
        if date >= start && date <= end {
            *counts.entry(date).or_default() += 1;
        }
    }

    start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(|date| TimeseriesBucket {
            date,
            count: counts.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use crash_map_crash_models::{Attributes, CrashSeverity};

    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn point_on(month: u32, day: u32, hour: u32) -> PointRecord {
        PointRecord::new(
            format!("{month}-{day}-{hour}"),
            Utc.with_ymd_and_hms(2025, month, day, hour, 0, 0).unwrap(),
            -73.98,
            40.75,
            CrashSeverity::Minimal,
            Attributes::new(),
        )
    }

    #[test]
    fn empty_input_yields_zero_filled_window() {
        let buckets = daily_counts(&[], date(3, 31), DEFAULT_WINDOW_DAYS);
        assert_eq!(buckets.len(), 30);
        assert!(buckets.iter().all(|b| b.count == 0));
        assert_eq!(buckets[0].date, date(3, 2));
        assert_eq!(buckets[29].date, date(3, 31));
        assert!(
            buckets
                .windows(2)
                .all(|w| w[0].date.succ_opt() == Some(w[1].date))
        );
    }

    #[test]
    fn counts_points_per_day() {
        let points = vec![
            point_on(3, 30, 1),
            point_on(3, 30, 23),
            point_on(3, 31, 0),
            point_on(3, 1, 12),
            point_on(4, 1, 0),
        ];
        let buckets = daily_counts(&points, date(3, 31), 30);
        assert_eq!(buckets.len(), 30);
        assert_eq!(buckets[28].count, 2);
        assert_eq!(buckets[29].count, 1);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u64>(), 3);
    }

    #[test]
    fn window_crosses_month_boundary() {
        let buckets = daily_counts(&[point_on(3, 1, 5)], date(3, 2), 3);
        let dates: Vec<NaiveDate> = buckets.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(2, 28), date(3, 1), date(3, 2)]);
        assert_eq!(buckets[1].count, 1);
    }

    #[test]
    fn zero_day_window_is_empty() {
        assert!(daily_counts(&[point_on(3, 1, 5)], date(3, 1), 0).is_empty());
    }
}
