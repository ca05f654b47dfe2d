//! Minimal WKT codec for the point geometries stored in the cache.

/// Formats a WGS84 coordinate as `POINT(lon lat)`.
#[must_use]
pub fn point_wkt(longitude: f64, latitude: f64) -> String {
    format!("POINT({longitude} {latitude})")
}

/// Parses `POINT(lon lat)` (case-insensitive, optional whitespace) into
/// `(longitude, latitude)`.
///
/// Returns `None` for any other geometry type or non-finite coordinates.
#[must_use]
pub fn parse_point_wkt(s: &str) -> Option<(f64, f64)> {
    let trimmed = s.trim();
    let (tag, rest) = trimmed.split_at_checked(5)?;
    if !tag.eq_ignore_ascii_case("POINT") {
        return None;
    }

    let inner = rest
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')?
        .trim();

    let mut parts = inner.split_whitespace();
    let longitude: f64 = parts.next()?.parse().ok()?;
    let latitude: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !longitude.is_finite() || !latitude.is_finite() {
        return None;
    }

    Some((longitude, latitude))
}
