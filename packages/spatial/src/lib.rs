#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for cached crash points.
//!
//! Builds an R-tree over the bounding boxes of cache entries and answers
//! envelope queries with the slots (positions) of candidate entries. The
//! index is a pre-filter only; callers apply the exact containment or
//! distance test to the candidates it returns.

use crash_map_crash_models::BoundingBox;
use geo::{Distance as _, Haversine, Point};
use rstar::{AABB, RTree, RTreeObject};

/// Mean earth radius in meters used for envelope construction.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Relative slack added to radius envelopes so floating point error in the
/// envelope never excludes a point that passes the distance test.
const ENVELOPE_SLACK: f64 = 1e-6;

/// An entry slot stored in the R-tree with its envelope.
struct IndexedSlot {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedSlot {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bounding-box index over a slice of cache entries, addressed by slot.
pub struct PointIndex {
    tree: RTree<IndexedSlot>,
}

impl PointIndex {
    /// Bulk-loads an index where slot `i` is the `i`-th bounding box.
    #[must_use]
    pub fn build<'a>(boxes: impl IntoIterator<Item = &'a BoundingBox>) -> Self {
        let slots: Vec<IndexedSlot> = boxes
            .into_iter()
            .enumerate()
            .map(|(slot, bbox)| IndexedSlot {
                slot,
                envelope: to_aabb(bbox),
            })
            .collect();

        let tree = RTree::bulk_load(slots);
        log::debug!("Built point index with {} entries", tree.size());

        Self { tree }
    }

    /// Creates an index with no entries.
    #[must_use]
    pub fn empty() -> Self {
        Self { tree: RTree::new() }
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Returns the slots whose envelopes intersect `bbox`, in ascending
    /// slot order.
    #[must_use]
    pub fn candidates(&self, bbox: &BoundingBox) -> Vec<usize> {
        let query_env = to_aabb(bbox);
        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .map(|entry| entry.slot)
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Returns the slots whose envelopes intersect any of `boxes`, in
    /// ascending slot order and without duplicates.
    #[must_use]
    pub fn candidates_any(&self, boxes: &[BoundingBox]) -> Vec<usize> {
        let mut slots: Vec<usize> = boxes.iter().flat_map(|b| self.candidates(b)).collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }
}

impl Default for PointIndex {
    fn default() -> Self {
        Self::empty()
    }
}

fn to_aabb(bbox: &BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.west, bbox.south], [bbox.east, bbox.north])
}

/// Great-circle (haversine) distance in meters between two WGS84 points.
#[must_use]
pub fn great_circle_distance_m(lon_a: f64, lat_a: f64, lon_b: f64, lat_b: f64) -> f64 {
    Haversine.distance(Point::new(lon_a, lat_a), Point::new(lon_b, lat_b))
}

/// Computes bounding boxes that together enclose every point within
/// `radius_m` meters (great-circle) of `(longitude, latitude)`.
///
/// The longitude half-span widens with latitude:
/// `asin(sin(d) / cos(lat))` for angular radius `d`. Near the poles the box
/// spans all longitudes. A circle crossing the antimeridian yields two
/// boxes, one on each side; otherwise there is exactly one.
#[must_use]
pub fn radius_envelopes(longitude: f64, latitude: f64, radius_m: f64) -> Vec<BoundingBox> {
    let angular = (radius_m / EARTH_RADIUS_M) * (1.0 + ENVELOPE_SLACK);
    let lat_rad = latitude.to_radians();

    let south = (lat_rad - angular).to_degrees().max(-90.0);
    let north = (lat_rad + angular).to_degrees().min(90.0);

    let cos_lat = lat_rad.cos();
    let sin_angular = angular.sin();
    if south <= -90.0 || north >= 90.0 || sin_angular >= cos_lat {
        return vec![BoundingBox::new(-180.0, south, 180.0, north)];
    }

    let half_span = (sin_angular / cos_lat).asin().to_degrees();
    let (west, east) = (longitude - half_span, longitude + half_span);

    if west < -180.0 {
        vec![
            BoundingBox::new(-180.0, south, east, north),
            BoundingBox::new(west + 360.0, south, 180.0, north),
        ]
    } else if east > 180.0 {
        vec![
            BoundingBox::new(west, south, 180.0, north),
            BoundingBox::new(-180.0, south, east - 360.0, north),
        ]
    } else {
        vec![BoundingBox::new(west, south, east, north)]
    }
}
