//! Polygon geometry: the pure clipping kernel, WKT codec and GeoJSON output.

pub mod codec;
pub mod feature;
pub mod kernel;

pub use codec::{parse_wkt, to_wkt};
pub use feature::{Feature, FeatureCollection, FeatureProperties};
pub use kernel::{
    area, area_hectares, buffer, deg_to_hectares, difference, intersects, validate_and_repair,
};
