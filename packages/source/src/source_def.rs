//! Config-driven city crash source definition.
//!
//! [`CitySource`] captures everything unique about a city's crash dataset in
//! a serializable config struct: the Socrata endpoint, the column names, and
//! the city bounding box. A single generic implementation fetches and
//! normalizes every city.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime, Utc};
use crash_map_crash_models::{Attributes, BoundingBox, CrashSeverity, PointRecord};
use serde::Deserialize;

use crate::parsing::{
    get_count, get_f64, get_string, parse_clock_time, parse_lon_lat, parse_socrata_date,
    with_time,
};
use crate::socrata::{SocrataConfig, fetch_socrata};
use crate::{CrashSource, FetchOptions, SourceError};

const fn default_page_size() -> u64 {
    5000
}

const fn default_timeout_secs() -> u64 {
    30
}

/// A complete, config-driven city crash source.
///
/// Loaded from TOML files at compile time and used as the sole
/// [`CrashSource`] implementation.
#[derive(Debug, Clone, Deserialize)]
pub struct CitySource {
    /// Unique identifier (e.g., `"nyc"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// City name.
    pub city: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Socrata resource URL.
    pub api_url: String,
    /// Records per page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Rows outside this box are dropped during normalization.
    pub bounds: BoundingBox,
    /// Field name mappings for normalization.
    pub fields: FieldMapping,
}

/// Upstream column names for each canonical field.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Stable record identifier.
    pub id: String,
    /// Floating timestamp of the crash date.
    pub date: String,
    /// Optional `HH:MM` clock time. When absent the time in `date` is kept.
    #[serde(default)]
    pub time: Option<String>,
    /// Latitude column.
    pub latitude: String,
    /// Longitude column.
    pub longitude: String,
    /// Count of people injured.
    #[serde(default)]
    pub injured: Option<String>,
    /// Count of people killed.
    #[serde(default)]
    pub killed: Option<String>,
    /// Columns copied verbatim into the record attributes.
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl FieldMapping {
    /// Comma-separated `$select` list of every mapped column.
    #[must_use]
    pub fn select_clause(&self) -> String {
        let mut columns: Vec<&str> = vec![&self.id, &self.date];
        columns.extend(self.time.as_deref());
        columns.push(&self.latitude);
        columns.push(&self.longitude);
        columns.extend(self.injured.as_deref());
        columns.extend(self.killed.as_deref());
        columns.extend(self.attributes.iter().map(String::as_str));
        columns.join(", ")
    }
}

impl CitySource {
    /// Builds the `$where` clause for the window `start..=end`, restricted
    /// to rows with coordinates inside the city box.
    #[must_use]
    pub fn window_where_clause(&self, start: NaiveDate, end: NaiveDate) -> String {
        let f = &self.fields;
        let b = &self.bounds;
        format!(
            "{date} between '{start}T00:00:00' and '{end}T23:59:59' \
             and {lat} is not null and {lon} is not null \
             and {lat} between {south} and {north} \
             and {lon} between {west} and {east}",
            date = f.date,
            lat = f.latitude,
            lon = f.longitude,
            south = b.south,
            north = b.north,
            west = b.west,
            east = b.east,
        )
    }

    /// Normalizes a single page of raw JSON records into [`PointRecord`]s.
    ///
    /// Rows with a missing id, an unparseable date, or missing, zero, or
    /// out-of-bounds coordinates are dropped.
    #[must_use]
    pub fn normalize_page(&self, records: &[serde_json::Value]) -> Vec<PointRecord> {
        let fields = &self.fields;
        let mut points = Vec::with_capacity(records.len());
        let mut dropped = 0usize;

        for record in records {
            let Some(id) = get_string(record, &fields.id) else {
                log::debug!("{}: dropping row without {}", self.id, fields.id);
                dropped += 1;
                continue;
            };

            let Some(date) = get_string(record, &fields.date)
                .as_deref()
                .and_then(parse_socrata_date)
            else {
                log::debug!("{}: dropping {id}, unparseable date", self.id);
                dropped += 1;
                continue;
            };

            let Some((longitude, latitude)) = parse_lon_lat(
                get_f64(record, &fields.longitude),
                get_f64(record, &fields.latitude),
            )
            .filter(|(lon, lat)| self.bounds.contains(*lon, *lat)) else {
                log::debug!("{}: dropping {id}, missing or out-of-bounds coordinates", self.id);
                dropped += 1;
                continue;
            };

            let occurred_at = match fields.time.as_deref() {
                Some(time_field) => {
                    let time = get_string(record, time_field)
                        .as_deref()
                        .and_then(parse_clock_time)
                        .unwrap_or(NaiveTime::MIN);
                    with_time(date, time)
                }
                None => date,
            };

            let injured = fields
                .injured
                .as_deref()
                .map_or(0, |f| get_count(record, f));
            let killed = fields.killed.as_deref().map_or(0, |f| get_count(record, f));

            let attributes: Attributes = fields
                .attributes
                .iter()
                .filter_map(|name| {
                    record
                        .get(name)
                        .filter(|v| !v.is_null())
                        .map(|v| (name.clone(), v.clone()))
                })
                .collect();

            points.push(PointRecord::new(
                id,
                occurred_at,
                longitude,
                latitude,
                CrashSeverity::from_casualties(injured, killed),
                attributes,
            ));
        }

        if dropped > 0 {
            log::info!(
                "{}: normalized {} records, dropped {dropped} malformed rows",
                self.id,
                points.len()
            );
        }

        points
    }

    fn client(&self) -> Result<reqwest::Client, SourceError> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?)
    }
}

#[async_trait]
impl CrashSource for CitySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    async fn fetch_window(&self, options: &FetchOptions) -> Result<Vec<PointRecord>, SourceError> {
        let end = Utc::now().date_naive();
        let start = end
            .checked_sub_days(Days::new(u64::from(options.days_back)))
            .unwrap_or(NaiveDate::MIN);

        let select = self.fields.select_clause();
        let where_clause = self.window_where_clause(start, end);
        let config = SocrataConfig {
            api_url: &self.api_url,
            date_column: &self.fields.date,
            select: Some(&select),
            where_clause: Some(&where_clause),
            label: &self.id,
            page_size: self.page_size,
        };

        let client = self.client()?;
        let raw = fetch_socrata(&client, &config, options.limit).await?;
        Ok(self.normalize_page(&raw))
    }
}

/// Parses a [`CitySource`] from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_source_toml(toml_str: &str) -> Result<CitySource, SourceError> {
    Ok(toml::de::from_str(toml_str)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nyc() -> CitySource {
        parse_source_toml(include_str!("../sources/nyc.toml")).unwrap()
    }

    #[test]
    fn parses_nyc_toml() {
        let def = nyc();
        assert_eq!(def.id, "nyc");
        assert_eq!(def.city, "New York");
        assert_eq!(def.fields.time.as_deref(), Some("crash_time"));
        assert!(def.bounds.is_valid());
    }

    #[test]
    fn chicago_has_no_time_field() {
        let def = parse_source_toml(include_str!("../sources/chicago.toml")).unwrap();
        assert!(def.fields.time.is_none());
        assert_eq!(def.page_size, 5000);
    }

    #[test]
    fn rejects_incomplete_toml() {
        assert!(parse_source_toml("id = \"x\"").is_err());
    }

    #[test]
    fn builds_window_where_clause() {
        let def = nyc();
        let clause = def.window_where_clause(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        );
        assert!(clause.starts_with(
            "crash_date between '2025-01-01T00:00:00' and '2025-01-31T23:59:59'"
        ));
        assert!(clause.contains("latitude between 40.4774 and 40.9176"));
        assert!(clause.contains("longitude between -74.2591 and -73.7004"));
    }

    #[test]
    fn select_clause_lists_mapped_columns() {
        let select = nyc().fields.select_clause();
        assert!(select.starts_with("collision_id, crash_date, crash_time, latitude, longitude"));
        assert!(select.ends_with("vehicle_type_code1"));
    }

    #[test]
    fn normalizes_valid_row() {
        let rows = vec![serde_json::json!({
            "collision_id": "4701234",
            "crash_date": "2025-03-04T00:00:00.000",
            "crash_time": "9:05",
            "latitude": "40.75",
            "longitude": "-73.98",
            "number_of_persons_injured": "2",
            "number_of_persons_killed": "0",
            "borough": "MANHATTAN",
        })];
        let points = nyc().normalize_page(&rows);
        assert_eq!(points.len(), 1);

        let p = &points[0];
        assert_eq!(p.id, "4701234");
        assert_eq!(p.occurred_at.to_string(), "2025-03-04 09:05:00 UTC");
        assert_eq!(p.hour, 9);
        assert_eq!(p.severity, CrashSeverity::Moderate);
        assert_eq!(p.attributes.get("borough"), Some(&serde_json::json!("MANHATTAN")));
        assert!(!p.attributes.contains_key("on_street_name"));
    }

    #[test]
    fn missing_time_defaults_to_midnight() {
        let rows = vec![serde_json::json!({
            "collision_id": "1",
            "crash_date": "2025-03-04T00:00:00.000",
            "latitude": "40.75",
            "longitude": "-73.98",
        })];
        let points = nyc().normalize_page(&rows);
        assert_eq!(points[0].hour, 0);
        assert_eq!(points[0].severity, CrashSeverity::Minimal);
    }

    #[test]
    fn drops_malformed_rows() {
        let rows = vec![
            // no id
            serde_json::json!({
                "crash_date": "2025-03-04T00:00:00.000",
                "latitude": "40.75", "longitude": "-73.98",
            }),
            // bad date
            serde_json::json!({
                "collision_id": "2", "crash_date": "yesterday",
                "latitude": "40.75", "longitude": "-73.98",
            }),
            // zero coordinates
            serde_json::json!({
                "collision_id": "3", "crash_date": "2025-03-04T00:00:00.000",
                "latitude": "0", "longitude": "0",
            }),
            // outside the city box
            serde_json::json!({
                "collision_id": "4", "crash_date": "2025-03-04T00:00:00.000",
                "latitude": "41.88", "longitude": "-87.63",
            }),
            // missing latitude
            serde_json::json!({
                "collision_id": "5", "crash_date": "2025-03-04T00:00:00.000",
                "longitude": "-73.98",
            }),
            serde_json::json!({
                "collision_id": "6", "crash_date": "2025-03-04T00:00:00.000",
                "latitude": "40.75", "longitude": "-73.98",
            }),
        ];
        let points = nyc().normalize_page(&rows);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "6");
    }

    #[tokio::test]
    async fn unresponsive_upstream_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            // accept and hold the connection without ever responding
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let mut def = nyc();
        def.api_url = format!("http://{addr}/resource/test.json");
        def.timeout_secs = 1;

        let options = FetchOptions {
            days_back: 30,
            limit: 10,
        };
        let started = std::time::Instant::now();
        let result = def.fetch_window(&options).await;

        match result {
            Err(SourceError::Http(e)) => assert!(e.is_timeout(), "not a timeout: {e}"),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }
}
