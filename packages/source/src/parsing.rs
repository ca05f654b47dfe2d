//! Shared parsing utilities for Socrata crash records.
//!
//! Socrata returns most scalar columns as JSON strings, so every extractor
//! here accepts both string and native JSON encodings.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};

/// Parses a Socrata floating timestamp (ISO 8601 with optional fractional
/// seconds). The wall-clock value is taken as UTC.
#[must_use]
pub fn parse_socrata_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

/// Parses a clock time like `"9:05"`, `"14:30"` or `"14:30:15"`.
#[must_use]
pub fn parse_clock_time(s: &str) -> Option<NaiveTime> {
    let mut parts = s.trim().split(':');
    let hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = parts.next()?.trim().parse().ok()?;
    let second: u32 = match parts.next() {
        Some(sec) => sec.trim().parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Replaces the time of day of `date` with `time`.
#[must_use]
pub fn with_time(date: DateTime<Utc>, time: NaiveTime) -> DateTime<Utc> {
    NaiveDateTime::new(date.date_naive(), time).and_utc()
}

/// Gets a non-empty string value from a JSON object by field name. Numbers
/// are rendered to strings so numeric ids are accepted.
#[must_use]
pub fn get_string(record: &serde_json::Value, field: &str) -> Option<String> {
    match record.get(field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Gets an f64 from a JSON string or number field.
#[must_use]
pub fn get_f64(record: &serde_json::Value, field: &str) -> Option<f64> {
    let value = record.get(field)?;
    let parsed = value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))?;
    parsed.is_finite().then_some(parsed)
}

/// Gets a non-negative count from a JSON string or number field. Missing or
/// unparseable values count as zero.
#[must_use]
pub fn get_count(record: &serde_json::Value, field: &str) -> u32 {
    get_f64(record, field)
        .filter(|v| *v >= 0.0)
        .map(|v| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = v.min(f64::from(u32::MAX)) as u32;
            count
        })
        .unwrap_or(0)
}

/// Parses a coordinate pair, rejecting missing, zero, non-finite or
/// out-of-range values. Returns `(longitude, latitude)`.
#[must_use]
pub fn parse_lon_lat(longitude: Option<f64>, latitude: Option<f64>) -> Option<(f64, f64)> {
    let longitude = longitude?;
    let latitude = latitude?;
    if longitude == 0.0
        || latitude == 0.0
        || !(-180.0..=180.0).contains(&longitude)
        || !(-90.0..=90.0).contains(&latitude)
    {
        return None;
    }
    Some((longitude, latitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_socrata_date_with_fractional() {
        let dt = parse_socrata_date("2024-01-15T14:30:00.000").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn parses_socrata_date_without_fractional() {
        let dt = parse_socrata_date("2024-01-15T14:30:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn rejects_invalid_date() {
        assert!(parse_socrata_date("not-a-date").is_none());
    }

    #[test]
    fn parses_clock_times() {
        assert_eq!(
            parse_clock_time("9:05"),
            NaiveTime::from_hms_opt(9, 5, 0)
        );
        assert_eq!(
            parse_clock_time("23:59:30"),
            NaiveTime::from_hms_opt(23, 59, 30)
        );
        assert!(parse_clock_time("24:00").is_none());
        assert!(parse_clock_time("noon").is_none());
        assert!(parse_clock_time("1:2:3:4").is_none());
    }

    #[test]
    fn combines_date_and_time() {
        let date = parse_socrata_date("2024-01-15T00:00:00.000").unwrap();
        let dt = with_time(date, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");
    }

    #[test]
    fn reads_string_and_numeric_fields() {
        let record = serde_json::json!({
            "collision_id": 4_701_234,
            "name": " BROOKLYN ",
            "blank": "",
            "latitude": "40.75",
            "injured": 2,
            "killed": "1",
            "bogus": "x",
        });
        assert_eq!(get_string(&record, "collision_id").unwrap(), "4701234");
        assert_eq!(get_string(&record, "name").unwrap(), "BROOKLYN");
        assert!(get_string(&record, "blank").is_none());
        assert!((get_f64(&record, "latitude").unwrap() - 40.75).abs() < f64::EPSILON);
        assert_eq!(get_count(&record, "injured"), 2);
        assert_eq!(get_count(&record, "killed"), 1);
        assert_eq!(get_count(&record, "bogus"), 0);
        assert_eq!(get_count(&record, "missing"), 0);
    }

    #[test]
    fn rejects_zero_and_out_of_range_coordinates() {
        assert_eq!(parse_lon_lat(Some(-73.98), Some(40.75)), Some((-73.98, 40.75)));
        assert!(parse_lon_lat(Some(0.0), Some(40.75)).is_none());
        assert!(parse_lon_lat(Some(-73.98), None).is_none());
        assert!(parse_lon_lat(Some(-200.0), Some(40.75)).is_none());
        assert!(parse_lon_lat(Some(-73.98), Some(91.0)).is_none());
    }
}
