//! Pure geometry operations used by the clipping orchestrator.
//!
//! Every operation works on `MultiPolygon<f64>` in geographic (lon/lat)
//! coordinates and has no side effects. Operations that can produce an
//! unusable shape return `None` so callers can skip instead of failing.

use geo::{Area, BooleanOps, Buffer, Centroid, Intersects, Validation};
use geo_types::MultiPolygon;

/// Meters per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEGREE: f64 = 111_320.0;

const SQ_METERS_PER_HECTARE: f64 = 10_000.0;

/// A geometry is usable when it has at least one polygon and is
/// topologically valid.
fn is_usable(geom: &MultiPolygon<f64>) -> bool {
    !geom.0.is_empty() && geom.is_valid()
}

/// Returns the geometry unchanged when valid, otherwise attempts a
/// zero-distance buffer repair. `None` means the shape cannot be repaired.
pub fn validate_and_repair(geom: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    if is_usable(geom) {
        return Some(geom.clone());
    }
    let repaired = geom.buffer(0.0);
    is_usable(&repaired).then_some(repaired)
}

pub fn intersects(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> bool {
    a.intersects(b)
}

/// `a` minus `b`. `None` when the result is empty or invalid.
pub fn difference(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let result = a.difference(b);
    is_usable(&result).then_some(result)
}

/// Grows (or shrinks) `geom` by `distance` coordinate units.
pub fn buffer(geom: &MultiPolygon<f64>, distance: f64) -> Option<MultiPolygon<f64>> {
    if !distance.is_finite() {
        return None;
    }
    let result = geom.buffer(distance);
    is_usable(&result).then_some(result)
}

/// Planar area in square degrees.
pub fn area(geom: &MultiPolygon<f64>) -> f64 {
    geom.unsigned_area()
}

/// Converts square degrees to hectares with an equirectangular
/// approximation at the given latitude.
pub fn deg_to_hectares(area_deg: f64, latitude: f64) -> f64 {
    let sq_meters = area_deg * METERS_PER_DEGREE * METERS_PER_DEGREE * latitude.to_radians().cos();
    sq_meters / SQ_METERS_PER_HECTARE
}

/// Area in hectares, corrected at the geometry's centroid latitude.
pub fn area_hectares(geom: &MultiPolygon<f64>) -> f64 {
    let latitude = geom.centroid().map(|c| c.y()).unwrap_or(0.0);
    deg_to_hectares(area(geom), latitude)
}
