//! GeoJSON file export of cached crashes.

use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use crash_map_analytics::qaqc::run_qaqc;
use crash_map_analytics_models::QaqcReport;
use crash_map_database::CacheStore;
use crash_map_server_models::crashes_to_feature_collection;
use geojson::FeatureCollection;

use crate::IngestError;

/// Result of exporting a city's cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    /// File the collection was written to.
    pub path: PathBuf,
    /// Number of features written.
    pub features: usize,
    /// Geometry checks over the exported entries.
    pub qaqc: QaqcReport,
}

/// Writes a `FeatureCollection` as pretty-printed JSON, creating parent
/// directories as needed. Returns the written path.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be created or written,
/// or [`IngestError::Json`] if serialization fails.
pub fn write_geojson(path: &Path, collection: &FeatureCollection) -> Result<PathBuf, IngestError> {
    if let Some(parent) = path.parent() {
        crash_map_database::paths::ensure_dir(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, collection)?;
    writer.flush()?;

    log::info!(
        "Wrote {} features to {}",
        collection.features.len(),
        path.display()
    );
    Ok(path.to_path_buf())
}

/// Runs the crash geometry checks over the cache and writes every cached
/// crash, newest first, to `path`.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be written.
pub fn export_crashes(store: &CacheStore, path: &Path) -> Result<ExportOutcome, IngestError> {
    let qaqc = run_qaqc(&[], store.entries());

    let records: Vec<_> = store.entries().iter().map(|e| e.record.clone()).collect();
    let collection = crashes_to_feature_collection(&records);
    let path = write_geojson(path, &collection)?;

    Ok(ExportOutcome {
        path,
        features: collection.features.len(),
        qaqc,
    })
}
