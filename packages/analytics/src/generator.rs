//! Synthetic road grids and crash points for exercising the road risk
//! pipeline without an upstream source.
//!
//! Roads are laid out on a jittered orthogonal grid in local meters and
//! projected to WGS84 around [`GenerationConfig::origin`]. Crashes are
//! Poisson-sampled along the roads in proportion to length, with a
//! heavy-tailed severity.

use chrono::{Days, NaiveDate, NaiveTime};
use crash_map_analytics_models::{Road, RoadClass};
use crash_map_crash_models::{Attributes, CrashSeverity, PointRecord};
use crash_map_spatial::EARTH_RADIUS_M;
use rand::distr::weighted::WeightedIndex;
use rand::{Rng as _, SeedableRng as _};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as _, Normal, Pareto, Poisson};

use crate::AnalyticsError;
use crate::roads::path_length_m;

/// Standard deviation (meters) of the scatter applied to each crash.
const CRASH_JITTER_M: f64 = 10.0;

/// Pareto shape for the severity tail.
const SEVERITY_SHAPE: f64 = 1.3;

/// Every third grid line is an arterial.
const ARTERIAL_EVERY: u32 = 3;

/// Parameters for a synthetic road grid and its crashes.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Grid cells per axis; the grid has `size + 1` roads each way.
    pub size: u32,
    /// Meters between parallel roads.
    pub spacing_m: f64,
    /// Standard deviation (meters) of each road's offset from the grid.
    pub jitter_m: f64,
    /// Expected crashes per meter of road.
    pub crash_rate: f64,
    pub seed: u64,
    /// South-west corner of the grid as `[longitude, latitude]`.
    pub origin: [f64; 2],
    /// Crashes are spread over this many days ending at the end date.
    pub window_days: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            size: 10,
            spacing_m: 1_000.0,
            jitter_m: 120.0,
            crash_rate: 0.0006,
            seed: 123,
            origin: [-74.05, 40.62],
            window_days: 30,
        }
    }
}

impl GenerationConfig {
    fn validate(&self) -> Result<(), AnalyticsError> {
        let reason = if self.size == 0 {
            "size must be at least 1"
        } else if !(self.spacing_m.is_finite() && self.spacing_m > 0.0) {
            "spacing must be positive"
        } else if !(self.jitter_m.is_finite() && self.jitter_m >= 0.0) {
            "jitter must be non-negative"
        } else if !(self.crash_rate.is_finite() && self.crash_rate >= 0.0) {
            "crash rate must be non-negative"
        } else if !(-180.0..=180.0).contains(&self.origin[0])
            || !(-80.0..=80.0).contains(&self.origin[1])
        {
            "origin must be within longitude -180..180 and latitude -80..80"
        } else {
            return Ok(());
        };
        Err(invalid(reason))
    }

    /// Projects local grid meters to `[longitude, latitude]`.
    fn to_lon_lat(&self, x: f64, y: f64) -> [f64; 2] {
        let [lon0, lat0] = self.origin;
        [
            lon0 + (x / (EARTH_RADIUS_M * lat0.to_radians().cos())).to_degrees(),
            lat0 + (y / EARTH_RADIUS_M).to_degrees(),
        ]
    }
}

fn invalid(reason: impl Into<String>) -> AnalyticsError {
    AnalyticsError::InvalidGeneration {
        reason: reason.into(),
    }
}

/// Generates a jittered orthogonal road grid: `size + 1` east-west roads
/// followed by `size + 1` north-south roads, with ids from 1.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidGeneration`] if the config is out of
/// range.
pub fn generate_roads(config: &GenerationConfig) -> Result<Vec<Road>, AnalyticsError> {
    config.validate()?;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let offset = Normal::new(0.0, config.jitter_m).map_err(|e| invalid(e.to_string()))?;
    let extent = f64::from(config.size) * config.spacing_m;

    let mut lines: Vec<(u32, [[f64; 2]; 2])> = Vec::new();
    for i in 0..=config.size {
        let y = f64::from(i).mul_add(config.spacing_m, offset.sample(&mut rng));
        lines.push((i, [[0.0, y], [extent, y]]));
    }
    for j in 0..=config.size {
        let x = f64::from(j).mul_add(config.spacing_m, offset.sample(&mut rng));
        lines.push((j, [[x, 0.0], [x, extent]]));
    }

    let roads: Vec<Road> = lines
        .into_iter()
        .zip(1u64..)
        .map(|((position, ends), road_id)| {
            let path: Vec<[f64; 2]> = ends
                .iter()
                .map(|[x, y]| config.to_lon_lat(*x, *y))
                .collect();
            let length_m = path_length_m(&path);
            Road {
                road_id,
                class: if position % ARTERIAL_EVERY == 0 {
                    RoadClass::Arterial
                } else {
                    RoadClass::Collector
                },
                path,
                length_m,
            }
        })
        .collect();

    log::debug!(
        "Generated {} roads on a {}x{} grid",
        roads.len(),
        config.size,
        config.size
    );

    Ok(roads)
}

/// Point at `fraction` (0-1) of the way along `path`, by great-circle
/// length.
fn interpolate_along(path: &[[f64; 2]], fraction: f64) -> [f64; 2] {
    let target = path_length_m(path) * fraction;
    let mut walked = 0.0;
    for pair in path.windows(2) {
        let [a, b] = [pair[0], pair[1]];
        let segment = path_length_m(pair);
        if segment > 0.0 && walked + segment >= target {
            let t = (target - walked) / segment;
            return [
                (b[0] - a[0]).mul_add(t, a[0]),
                (b[1] - a[1]).mul_add(t, a[1]),
            ];
        }
        walked += segment;
    }
    path.last().copied().unwrap_or_default()
}

/// Samples crashes along `roads`, dated within the `window_days` ending at
/// `end`.
///
/// The crash count is Poisson with mean `total length * crash_rate`
/// (at least 1). Each crash picks a road weighted by length, a uniform
/// position along it, and a small Gaussian scatter. Severity is a rounded
/// Pareto draw clamped to 1-5. Ids are `synthetic-1`, `synthetic-2`, and
/// so on; the road a crash was sampled from is kept in its `road_id`
/// attribute.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidGeneration`] if the config is out of
/// range or no road has a positive length.
pub fn generate_crashes(
    roads: &[Road],
    config: &GenerationConfig,
    end: NaiveDate,
) -> Result<Vec<PointRecord>, AnalyticsError> {
    config.validate()?;
    if roads.is_empty() {
        return Ok(Vec::new());
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let total_length: f64 = roads.iter().map(|r| r.length_m).sum();
    let expected = (total_length * config.crash_rate).max(1.0);
    let count = Poisson::new(expected).map_err(|e| invalid(e.to_string()))?;
    let choose_road = WeightedIndex::new(roads.iter().map(|r| r.length_m))
        .map_err(|e| invalid(format!("road lengths cannot be sampled: {e}")))?;
    let scatter = Normal::new(0.0, CRASH_JITTER_M).map_err(|e| invalid(e.to_string()))?;
    let severity = Pareto::new(1.0, SEVERITY_SHAPE).map_err(|e| invalid(e.to_string()))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = count.sample(&mut rng) as u64;

    let crashes: Vec<PointRecord> = (1..=n)
        .map(|seq| {
            let road = &roads[choose_road.sample(&mut rng)];
            let [lon, lat] = interpolate_along(&road.path, rng.random::<f64>());
            let (dx, dy) = (scatter.sample(&mut rng), scatter.sample(&mut rng));
            let longitude =
                lon + (dx / (EARTH_RADIUS_M * lat.to_radians().cos())).to_degrees();
            let latitude = lat + (dy / EARTH_RADIUS_M).to_degrees();

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let level = severity.sample(&mut rng).round().clamp(1.0, 5.0) as u8;
            let hour = rng.random_range(0..24_i64);
            let days_back = rng.random_range(0..u64::from(config.window_days.max(1)));

            let date = end.checked_sub_days(Days::new(days_back)).unwrap_or(end);
            let occurred_at =
                (date.and_time(NaiveTime::MIN) + chrono::Duration::hours(hour)).and_utc();

            let mut attributes = Attributes::new();
            attributes.insert("road_id".to_string(), road.road_id.into());

            PointRecord::new(
                format!("synthetic-{seq}"),
                occurred_at,
                longitude,
                latitude,
                CrashSeverity::from_value(level).unwrap_or(CrashSeverity::Critical),
                attributes,
            )
        })
        .collect();

    log::debug!(
        "Generated {} crashes over {:.1} km of road (expected {expected:.1})",
        crashes.len(),
        total_length / 1000.0
    );

    Ok(crashes)
}
