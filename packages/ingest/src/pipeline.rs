//! Batch road risk pipeline over a synthetic network.
//!
//! Generates a road grid and crashes, exports both layers, loads the
//! crashes into their own cache file, checks geometry, snaps crashes to
//! roads, and writes the scored road layer.

use std::path::PathBuf;

use chrono::NaiveDate;
use crash_map_analytics::generator::{GenerationConfig, generate_crashes, generate_roads};
use crash_map_analytics::qaqc::run_qaqc;
use crash_map_analytics::roads::{DEFAULT_SEARCH_RADIUS_M, assign_nearest_roads, road_summary};
use crash_map_analytics_models::{QaqcReport, RoadSummary};
use crash_map_database::CacheStore;
use crash_map_server_models::{
    crashes_to_feature_collection, road_summaries_to_feature_collection,
    roads_to_feature_collection,
};

use crate::IngestError;
use crate::export::write_geojson;

/// File names written under the output directory.
pub const ROADS_FILE: &str = "roads.geojson";
pub const CRASHES_FILE: &str = "crashes.geojson";
pub const ROAD_SUMMARY_FILE: &str = "road_summary.geojson";
pub const DATABASE_FILE: &str = "synthetic.duckdb";

/// Inputs for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Synthetic network parameters.
    pub generation: GenerationConfig,
    /// Directory all outputs are written to.
    pub out_dir: PathBuf,
    /// Maximum crash-to-road distance in meters.
    pub search_radius_m: f64,
}

impl PipelineOptions {
    /// Default generation and search radius, writing to `out_dir`.
    #[must_use]
    pub fn new(out_dir: PathBuf) -> Self {
        Self {
            generation: GenerationConfig::default(),
            out_dir,
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
        }
    }
}

/// What a pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub roads: usize,
    pub crashes: usize,
    /// Crashes snapped to a road.
    pub assigned: usize,
    pub qaqc: QaqcReport,
    /// Scored roads, in road id order.
    pub summary: Vec<RoadSummary>,
    pub roads_path: PathBuf,
    pub crashes_path: PathBuf,
    pub summary_path: PathBuf,
    pub database_path: PathBuf,
}

/// Runs the pipeline with crashes dated in the window ending at `end`.
///
/// # Errors
///
/// Returns [`IngestError::Analytics`] if the generation config is out of
/// range, [`IngestError::Storage`] if the crash cache cannot be written,
/// or [`IngestError::Io`]/[`IngestError::Json`] if an output file cannot
/// be written.
pub fn run_pipeline(
    options: &PipelineOptions,
    end: NaiveDate,
) -> Result<PipelineOutcome, IngestError> {
    let out = &options.out_dir;
    log::info!(
        "Running road risk pipeline: {0}x{0} grid, seed {1}, output {2}",
        options.generation.size,
        options.generation.seed,
        out.display()
    );

    let roads = generate_roads(&options.generation)?;
    let crashes = generate_crashes(&roads, &options.generation, end)?;

    let roads_path = write_geojson(&out.join(ROADS_FILE), &roads_to_feature_collection(&roads))?;
    let crashes_path = write_geojson(
        &out.join(CRASHES_FILE),
        &crashes_to_feature_collection(&crashes),
    )?;

    let database_path = out.join(DATABASE_FILE);
    let mut store = CacheStore::open(&database_path)?;
    store.clear_and_replace(&crashes)?;

    let qaqc = run_qaqc(&roads, store.entries());

    let assignments = assign_nearest_roads(&crashes, &roads, options.search_radius_m);
    let assigned = assignments.iter().filter(|a| a.road_id.is_some()).count();
    let summary = road_summary(&roads, &assignments);

    let summary_path = write_geojson(
        &out.join(ROAD_SUMMARY_FILE),
        &road_summaries_to_feature_collection(&summary),
    )?;

    log::info!(
        "Pipeline complete: {} roads, {} crashes ({assigned} assigned)",
        roads.len(),
        crashes.len()
    );

    Ok(PipelineOutcome {
        roads: roads.len(),
        crashes: crashes.len(),
        assigned,
        qaqc,
        summary,
        roads_path,
        crashes_path,
        summary_path,
        database_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir()
            .join("crash_map_tests")
            .join(uuid::Uuid::new_v4().to_string())
    }

    fn options(out_dir: PathBuf) -> PipelineOptions {
        let mut options = PipelineOptions::new(out_dir);
        options.generation.size = 3;
        options
    }

    fn end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
    }

    fn read_json(path: &std::path::Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn pipeline_writes_every_layer() {
        let dir = temp_dir();
        let outcome = run_pipeline(&options(dir.clone()), end()).unwrap();

        assert_eq!(outcome.roads, 8);
        assert!(outcome.crashes > 0);
        assert_eq!(outcome.assigned, outcome.crashes);
        assert!(!outcome.qaqc.has_issues());
        assert_eq!(outcome.qaqc.roads_total, 8);
        assert_eq!(outcome.qaqc.crashes_total, outcome.crashes as u64);

        let roads = read_json(&outcome.roads_path);
        assert_eq!(roads["features"].as_array().unwrap().len(), 8);
        assert_eq!(roads["features"][0]["geometry"]["type"], "LineString");

        let crashes = read_json(&outcome.crashes_path);
        assert_eq!(
            crashes["features"].as_array().unwrap().len(),
            outcome.crashes
        );

        let summary = read_json(&outcome.summary_path);
        let features = summary["features"].as_array().unwrap();
        assert_eq!(features.len(), 8);
        let total: u64 = features
            .iter()
            .map(|f| f["properties"]["nCrashes"].as_u64().unwrap())
            .sum();
        assert_eq!(total, outcome.assigned as u64);

        let store = CacheStore::open(&outcome.database_path).unwrap();
        assert_eq!(store.len(), outcome.crashes);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn rerun_replaces_previous_outputs() {
        let dir = temp_dir();
        let first = run_pipeline(&options(dir.clone()), end()).unwrap();

        let mut reseeded = options(dir.clone());
        reseeded.generation.seed = 9;
        let second = run_pipeline(&reseeded, end()).unwrap();

        let store = CacheStore::open(&second.database_path).unwrap();
        assert_eq!(store.len(), second.crashes);
        assert_eq!(first.summary_path, second.summary_path);
        assert_eq!(
            read_json(&second.crashes_path)["features"]
                .as_array()
                .unwrap()
                .len(),
            second.crashes
        );

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn invalid_generation_writes_nothing() {
        let dir = temp_dir();
        let mut options = options(dir.clone());
        options.generation.size = 0;

        let result = run_pipeline(&options, end());

        assert!(matches!(result, Err(IngestError::Analytics(_))));
        assert!(!dir.exists());
    }
}
