//! `DuckDB`-backed geometry cache with an in-memory R-tree.
//!
//! The `crashes` table holds one row per record with its WKT geometry and
//! bounding box; `_meta` tracks the last refresh. After every committed
//! write the rows are reloaded and the index rebuilt, so queries always see
//! exactly what is stored.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use crash_map_crash_models::{
    Attributes, BoundingBox, CacheEntry, CrashSeverity, PointRecord, wkt,
};
use crash_map_spatial::{PointIndex, great_circle_distance_m, radius_envelopes};
use duckdb::Connection;

use crate::StorageError;

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 2_000;

/// Bound parameters per inserted row.
const COLUMNS_PER_ROW: usize = 12;

const LAST_REFRESHED_KEY: &str = "last_refreshed_at";

/// Persistent cache of crash records with a bounding-box index.
pub struct CacheStore {
    conn: Connection,
    entries: Vec<CacheEntry>,
    index: PointIndex,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Opens (or creates) a cache file, ensuring the schema exists and
    /// loading the index.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory, connection, schema, or any
    /// stored row cannot be set up or read.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            crate::paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        log::info!(
            "Opened crash cache at {} ({} records)",
            path.display(),
            store.len()
        );
        Ok(store)
    }

    /// Opens an empty cache that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the connection or schema fails.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        create_schema(&conn)?;
        let mut store = Self {
            conn,
            entries: Vec::new(),
            index: PointIndex::empty(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every cached entry, newest first.
    #[must_use]
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Inserts or overwrites records by id in one transaction. If the batch
    /// contains the same id more than once, the last occurrence wins.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the write fails; nothing is committed in
    /// that case.
    pub fn upsert(&mut self, records: &[PointRecord]) -> Result<u64, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let written = insert_records(&tx, records)?;
        tx.commit()?;

        self.reload()?;
        Ok(written)
    }

    /// Atomically replaces the whole cache with `records` and stamps the
    /// refresh time.
    ///
    /// On failure the transaction is rolled back and the previous contents,
    /// index included, stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if any part of the replacement fails.
    pub fn clear_and_replace(&mut self, records: &[PointRecord]) -> Result<u64, StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM crashes", [])?;
        let written = insert_records(&tx, records)?;
        set_meta(&tx, LAST_REFRESHED_KEY, &Utc::now().to_rfc3339())?;
        tx.commit()?;

        self.reload()?;
        log::info!("Replaced crash cache with {written} records");
        Ok(written)
    }

    /// Returns when the cache was last replaced, or `None` if it never was.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the query fails or the stored value is
    /// not a valid timestamp.
    pub fn last_refresh_time(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let Some(value) = get_meta(&self.conn, LAST_REFRESHED_KEY)? else {
            return Ok(None);
        };

        DateTime::parse_from_rfc3339(&value)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| StorageError::Corrupt {
                message: format!("invalid {LAST_REFRESHED_KEY} {value:?}: {e}"),
            })
    }

    /// Records inside `bbox` (edges inclusive), optionally restricted to
    /// one hour of day. Newest first.
    #[must_use]
    pub fn query_bbox(&self, bbox: &BoundingBox, hour: Option<u8>) -> Vec<PointRecord> {
        self.index
            .candidates(bbox)
            .into_iter()
            .filter_map(|slot| self.entries.get(slot))
            .map(|entry| &entry.record)
            .filter(|r| bbox.contains(r.longitude, r.latitude))
            .filter(|r| hour.is_none_or(|h| r.hour == h))
            .cloned()
            .collect()
    }

    /// Records within `radius_m` meters (great-circle) of the given point,
    /// optionally restricted to one hour of day. Newest first.
    #[must_use]
    pub fn query_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius_m: f64,
        hour: Option<u8>,
    ) -> Vec<PointRecord> {
        let envelopes = radius_envelopes(longitude, latitude, radius_m);

        self.index
            .candidates_any(&envelopes)
            .into_iter()
            .filter_map(|slot| self.entries.get(slot))
            .map(|entry| &entry.record)
            .filter(|r| {
                great_circle_distance_m(longitude, latitude, r.longitude, r.latitude) <= radius_m
            })
            .filter(|r| hour.is_none_or(|h| r.hour == h))
            .cloned()
            .collect()
    }

    /// Reloads all rows from the table and rebuilds the index.
    fn reload(&mut self) -> Result<(), StorageError> {
        let entries = load_entries(&self.conn)?;
        let index = PointIndex::build(entries.iter().map(|e| &e.bbox));
        self.entries = entries;
        self.index = index;
        Ok(())
    }
}

fn create_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS crashes (
            id TEXT NOT NULL PRIMARY KEY CHECK (id <> ''),
            occurred_at TIMESTAMP NOT NULL,
            hour SMALLINT NOT NULL CHECK (hour BETWEEN 0 AND 23),
            severity SMALLINT NOT NULL CHECK (severity BETWEEN 1 AND 5),
            longitude DOUBLE NOT NULL CHECK (longitude BETWEEN -180 AND 180),
            latitude DOUBLE NOT NULL CHECK (latitude BETWEEN -90 AND 90),
            wkt TEXT NOT NULL,
            min_lon DOUBLE NOT NULL,
            min_lat DOUBLE NOT NULL,
            max_lon DOUBLE NOT NULL,
            max_lat DOUBLE NOT NULL,
            attributes TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;

    Ok(())
}

/// Writes records with multi-row upserts. Callers own the transaction.
fn insert_records(conn: &Connection, records: &[PointRecord]) -> Result<u64, StorageError> {
    if records.is_empty() {
        return Ok(0);
    }

    // Deduplicate within the batch: keep last occurrence of each id
    let mut last_seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, record) in records.iter().enumerate() {
        last_seen.insert(&record.id, i);
    }
    let deduped: Vec<CacheEntry> = records
        .iter()
        .enumerate()
        .filter(|(i, r)| last_seen.get(r.id.as_str()) == Some(i))
        .map(|(_, r)| CacheEntry::new(r.clone()))
        .collect();

    if deduped.len() < records.len() {
        log::info!(
            "Deduplicated INSERT batch: {} -> {} rows ({} duplicates removed)",
            records.len(),
            deduped.len(),
            records.len() - deduped.len(),
        );
    }

    let mut total_written = 0u64;

    for chunk in deduped.chunks(CHUNK_SIZE) {
        let mut sql = String::from(
            "INSERT INTO crashes (
                id, occurred_at, hour, severity, longitude, latitude, wkt,
                min_lon, min_lat, max_lon, max_lat, attributes
            ) VALUES ",
        );

        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
        }

        sql.push_str(
            " ON CONFLICT (id) DO UPDATE SET
                occurred_at = EXCLUDED.occurred_at,
                hour = EXCLUDED.hour,
                severity = EXCLUDED.severity,
                longitude = EXCLUDED.longitude,
                latitude = EXCLUDED.latitude,
                wkt = EXCLUDED.wkt,
                min_lon = EXCLUDED.min_lon,
                min_lat = EXCLUDED.min_lat,
                max_lon = EXCLUDED.max_lon,
                max_lat = EXCLUDED.max_lat,
                attributes = EXCLUDED.attributes",
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for entry in chunk {
            let record = &entry.record;
            let attributes = serde_json::to_string(&record.attributes)?;

            stmt.raw_bind_parameter(param_idx, &record.id)?;
            stmt.raw_bind_parameter(
                param_idx + 1,
                record.occurred_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            )?;
            stmt.raw_bind_parameter(param_idx + 2, i16::from(record.hour))?;
            stmt.raw_bind_parameter(param_idx + 3, i16::from(record.severity.value()))?;
            stmt.raw_bind_parameter(param_idx + 4, record.longitude)?;
            stmt.raw_bind_parameter(param_idx + 5, record.latitude)?;
            stmt.raw_bind_parameter(param_idx + 6, &entry.wkt)?;
            stmt.raw_bind_parameter(param_idx + 7, entry.bbox.west)?;
            stmt.raw_bind_parameter(param_idx + 8, entry.bbox.south)?;
            stmt.raw_bind_parameter(param_idx + 9, entry.bbox.east)?;
            stmt.raw_bind_parameter(param_idx + 10, entry.bbox.north)?;
            stmt.raw_bind_parameter(param_idx + 11, attributes)?;

            param_idx += COLUMNS_PER_ROW;
        }

        let rows = stmt.raw_execute()?;
        total_written += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total_written)
}

/// A row as read back from the `crashes` table.
struct StoredRow {
    id: String,
    occurred_at: String,
    severity: i16,
    longitude: f64,
    latitude: f64,
    wkt: String,
    bbox: BoundingBox,
    attributes: String,
}

fn load_entries(conn: &Connection) -> Result<Vec<CacheEntry>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT id, occurred_at::TEXT, severity, longitude, latitude, wkt,
                min_lon, min_lat, max_lon, max_lat, attributes
         FROM crashes
         ORDER BY occurred_at DESC, id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(StoredRow {
            id: row.get(0)?,
            occurred_at: row.get(1)?,
            severity: row.get(2)?,
            longitude: row.get(3)?,
            latitude: row.get(4)?,
            wkt: row.get(5)?,
            bbox: BoundingBox::new(row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?),
            attributes: row.get(10)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(entry_from_row(row?)?);
    }

    Ok(entries)
}

fn entry_from_row(row: StoredRow) -> Result<CacheEntry, StorageError> {
    let corrupt = |message: String| StorageError::Corrupt {
        message: format!("{}: {message}", row.id),
    };

    let occurred_at = parse_timestamp(&row.occurred_at)
        .ok_or_else(|| corrupt(format!("invalid timestamp {:?}", row.occurred_at)))?;

    let severity = u8::try_from(row.severity)
        .ok()
        .and_then(|v| CrashSeverity::from_value(v).ok())
        .ok_or_else(|| corrupt(format!("invalid severity {}", row.severity)))?;

    if wkt::parse_point_wkt(&row.wkt) != Some((row.longitude, row.latitude)) {
        return Err(corrupt(format!("geometry {:?} does not match coordinates", row.wkt)));
    }

    let attributes: Attributes = serde_json::from_str(&row.attributes)?;

    let record = PointRecord::new(
        row.id,
        occurred_at,
        row.longitude,
        row.latitude,
        severity,
        attributes,
    );

    Ok(CacheEntry {
        record,
        wkt: row.wkt,
        bbox: row.bbox,
    })
}

/// Parses a `DuckDB` timestamp text representation into a UTC `DateTime`.
///
/// `DuckDB`'s `::TEXT` cast can produce several formats depending on the
/// stored precision:
/// - `2024-01-15 10:30:00` (no fractional seconds)
/// - `2024-01-15 10:30:00.123` (fractional seconds)
/// - `2024-01-15 10:30:00+00` (with timezone)
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    use chrono::NaiveDateTime;

    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%#z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    log::warn!("Failed to parse timestamp: {s:?}");
    None
}

/// Gets a metadata value from the `_meta` table.
fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    let mut stmt = conn.prepare("SELECT value FROM _meta WHERE key = ?")?;
    let result = stmt.query_row([key], |row| row.get(0));
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone as _};

    use super::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 15, 0).unwrap()
    }

    fn record(id: &str, lon: f64, lat: f64, occurred_at: DateTime<Utc>) -> PointRecord {
        PointRecord::new(
            id,
            occurred_at,
            lon,
            lat,
            CrashSeverity::Minimal,
            Attributes::new(),
        )
    }

    fn temp_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join("crash_map_tests")
            .join(format!("{}.duckdb", uuid::Uuid::new_v4()))
    }

    /// Deterministic scatter of points around midtown Manhattan.
    fn scatter(n: usize) -> Vec<PointRecord> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            #[allow(clippy::cast_precision_loss)]
            let unit = (state % 1_000_000) as f64 / 1_000_000.0;
            unit
        };

        (0..n)
            .map(|i| {
                let lon = -74.05 + next() * 0.15;
                let lat = 40.65 + next() * 0.15;
                #[allow(clippy::cast_possible_truncation)]
                let hour = (i % 24) as u32;
                #[allow(clippy::cast_possible_truncation)]
                let day = (i % 28) as u32 + 1;
                record(&format!("r{i}"), lon, lat, at(day, hour))
            })
            .collect()
    }

    #[test]
    fn hour_filtered_bbox_query_returns_only_matching_point() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .clear_and_replace(&[
                record("afternoon", -73.98, 40.75, at(1, 14)),
                record("night", -74.00, 40.70, at(1, 2)),
            ])
            .unwrap();

        let bbox = BoundingBox::new(-74.01, 40.69, -73.97, 40.76);
        let result = store.query_bbox(&bbox, Some(14));
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "afternoon");
        assert_eq!(result[0].hour, 14);

        assert_eq!(store.query_bbox(&bbox, None).len(), 2);
    }

    #[test]
    fn bbox_results_are_newest_first() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .clear_and_replace(&[
                record("a", -73.98, 40.75, at(1, 8)),
                record("b", -73.99, 40.76, at(1, 17)),
                record("c", -74.20, 40.60, at(2, 8)),
            ])
            .unwrap();

        let ids: Vec<String> = store
            .query_bbox(&BoundingBox::new(-74.0, 40.7, -73.9, 40.8), None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn bbox_query_matches_brute_force() {
        let points = scatter(500);
        let mut store = CacheStore::open_in_memory().unwrap();
        store.clear_and_replace(&points).unwrap();
        assert_eq!(store.len(), 500);

        let boxes = [
            BoundingBox::new(-74.0, 40.7, -73.95, 40.75),
            BoundingBox::new(-74.05, 40.65, -73.9, 40.8),
            BoundingBox::new(-73.93, 40.78, -73.91, 40.79),
            BoundingBox::new(10.0, 10.0, 11.0, 11.0),
        ];
        for bbox in &boxes {
            for hour in [None, Some(0), Some(13)] {
                let mut expected: Vec<&str> = points
                    .iter()
                    .filter(|p| bbox.contains(p.longitude, p.latitude))
                    .filter(|p| hour.is_none_or(|h| p.hour == h))
                    .map(|p| p.id.as_str())
                    .collect();
                expected.sort_unstable();

                let result = store.query_bbox(bbox, hour);
                let mut actual: Vec<&str> = result.iter().map(|p| p.id.as_str()).collect();
                actual.sort_unstable();

                assert_eq!(actual, expected, "bbox {bbox:?} hour {hour:?}");
            }
        }
    }

    #[test]
    fn radius_query_has_no_false_negatives() {
        let points = scatter(500);
        let mut store = CacheStore::open_in_memory().unwrap();
        store.clear_and_replace(&points).unwrap();

        for radius in [50.0, 250.0, 1_000.0] {
            let (lon, lat) = (-73.98, 40.72);
            let mut expected: Vec<&str> = points
                .iter()
                .filter(|p| great_circle_distance_m(lon, lat, p.longitude, p.latitude) <= radius)
                .map(|p| p.id.as_str())
                .collect();
            expected.sort_unstable();

            let result = store.query_radius(lon, lat, radius, None);
            let mut actual: Vec<&str> = result.iter().map(|p| p.id.as_str()).collect();
            actual.sort_unstable();

            assert_eq!(actual, expected, "radius {radius}");
        }
    }

    #[test]
    fn radius_query_includes_point_on_center() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .upsert(&[record("a", -73.98, 40.75, at(1, 8))])
            .unwrap();
        assert_eq!(store.query_radius(-73.98, 40.75, 1.0, None).len(), 1);
        assert!(store.query_radius(-73.98, 40.75, 1.0, Some(9)).is_empty());
    }

    #[test]
    fn radius_query_reaches_across_antimeridian() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .upsert(&[
                record("east", 179.9995, -17.0, at(1, 8)),
                record("west", -179.9995, -17.0, at(1, 9)),
            ])
            .unwrap();

        let mut ids: Vec<String> = store
            .query_radius(179.9995, -17.0, 500.0, None)
            .into_iter()
            .map(|p| p.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["east", "west"]);
    }

    #[test]
    fn entries_expose_stored_geometry_newest_first() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .upsert(&[
                record("old", -73.9, 40.7, at(1, 8)),
                record("new", -74.0, 40.8, at(2, 8)),
            ])
            .unwrap();

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].record.id, "new");
        assert_eq!(entries[0].wkt, wkt::point_wkt(-74.0, 40.8));
        assert_eq!(entries[1].record.id, "old");
    }

    #[test]
    fn upsert_overwrites_by_id() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let original = record("a", -73.98, 40.75, at(1, 8));
        store.upsert(std::slice::from_ref(&original)).unwrap();
        store.upsert(std::slice::from_ref(&original)).unwrap();
        assert_eq!(store.len(), 1);

        let moved = record("a", -73.90, 40.70, at(2, 9));
        store.upsert(std::slice::from_ref(&moved)).unwrap();
        assert_eq!(store.len(), 1);

        let all = store.query_bbox(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0), None);
        assert_eq!(all, vec![moved]);
    }

    #[test]
    fn duplicate_ids_in_one_batch_keep_last() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let first = record("a", -73.98, 40.75, at(1, 8));
        let last = record("a", -73.97, 40.74, at(1, 9));
        let written = store.upsert(&[first, last.clone()]).unwrap();

        assert_eq!(written, 1);
        let all = store.query_bbox(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0), None);
        assert_eq!(all, vec![last]);
    }

    #[test]
    fn records_round_trip_with_attributes() {
        let mut store = CacheStore::open_in_memory().unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("borough".to_string(), serde_json::json!("BROOKLYN"));
        attributes.insert("vehicles".to_string(), serde_json::json!(2));
        let original = PointRecord::new(
            "x1",
            at(3, 23),
            -73.95,
            40.65,
            CrashSeverity::High,
            attributes,
        );
        store.upsert(std::slice::from_ref(&original)).unwrap();

        let stored = store.query_bbox(&BoundingBox::new(-74.0, 40.6, -73.9, 40.7), Some(23));
        assert_eq!(stored, vec![original]);
    }

    #[test]
    fn replace_supersedes_previous_window() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .clear_and_replace(&[
                record("a", -73.98, 40.75, at(1, 8)),
                record("b", -73.99, 40.76, at(1, 9)),
            ])
            .unwrap();
        store
            .clear_and_replace(&[
                record("b", -73.99, 40.76, at(1, 9)),
                record("c", -73.97, 40.74, at(2, 9)),
            ])
            .unwrap();

        let ids: Vec<String> = store
            .query_bbox(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0), None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn failed_replace_leaves_previous_cache_intact() {
        let mut store = CacheStore::open_in_memory().unwrap();
        store
            .clear_and_replace(&[record("a", -73.98, 40.75, at(1, 8))])
            .unwrap();
        let refreshed = store.last_refresh_time().unwrap();

        let result = store.clear_and_replace(&[
            record("b", -73.99, 40.76, at(1, 9)),
            record("bad", 500.0, 40.76, at(1, 9)),
        ]);
        assert!(result.is_err());

        assert_eq!(store.len(), 1);
        let ids: Vec<String> = store
            .query_bbox(&BoundingBox::new(-180.0, -90.0, 180.0, 90.0), None)
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(store.last_refresh_time().unwrap(), refreshed);
    }

    #[test]
    fn last_refresh_time_is_stamped_by_replace_only() {
        let mut store = CacheStore::open_in_memory().unwrap();
        assert!(store.last_refresh_time().unwrap().is_none());

        store
            .upsert(&[record("a", -73.98, 40.75, at(1, 8))])
            .unwrap();
        assert!(store.last_refresh_time().unwrap().is_none());

        let before = Utc::now() - Duration::seconds(1);
        store.clear_and_replace(&[]).unwrap();
        let stamped = store.last_refresh_time().unwrap().unwrap();
        assert!(stamped >= before);
        assert!(store.is_empty());
    }

    #[test]
    fn cache_persists_across_reopen() {
        let path = temp_path();
        {
            let mut store = CacheStore::open(&path).unwrap();
            store
                .clear_and_replace(&[
                    record("a", -73.98, 40.75, at(1, 8)),
                    record("b", -73.99, 40.76, at(1, 17)),
                ])
                .unwrap();
        }

        let store = CacheStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.last_refresh_time().unwrap().is_some());
        assert_eq!(
            store
                .query_bbox(&BoundingBox::new(-74.0, 40.7, -73.9, 40.8), Some(17))
                .len(),
            1
        );

        drop(store);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn parses_duckdb_timestamp_text() {
        assert_eq!(parse_timestamp("2025-03-01 08:15:00"), Some(at(1, 8)));
        assert_eq!(parse_timestamp("2025-03-01 08:15:00.000"), Some(at(1, 8)));
        assert_eq!(parse_timestamp("2025-03-01 08:15:00+00"), Some(at(1, 8)));
        assert!(parse_timestamp("yesterday").is_none());
    }
}
