//! Source registry: loads all city definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a city is as simple as
//! creating a new TOML file and adding it to the list below.

use crate::source_def::{CitySource, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    ("nyc", include_str!("../sources/nyc.toml")),
    ("chicago", include_str!("../sources/chicago.toml")),
];

/// Returns all configured city sources, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<CitySource> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a configured city source by id.
#[must_use]
pub fn find_source(id: &str) -> Option<CitySource> {
    all_sources().into_iter().find(|s| s.id == id)
}
