#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Pure aggregations over spatially filtered crash points.
//!
//! Nothing here touches storage or the network: callers query the cache
//! and hand the resulting points to [`hotspots::compute_hotspots`],
//! [`timeseries::daily_counts`], or [`summary::summarize`]. The batch road
//! risk pipeline uses [`roads`], [`qaqc`], and the synthetic network in
//! [`generator`].

pub mod generator;
pub mod hotspots;
pub mod qaqc;
pub mod roads;
pub mod summary;
pub mod timeseries;

use thiserror::Error;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyticsError {
    /// Hotspot clustering needs at least one cluster.
    #[error("Invalid cluster count {k}: must be at least 1")]
    InvalidClusterCount {
        /// The requested cluster count.
        k: usize,
    },

    /// Synthetic network parameters cannot produce a network.
    #[error("Invalid generation config: {reason}")]
    InvalidGeneration {
        /// What is out of range.
        reason: String,
    },
}
