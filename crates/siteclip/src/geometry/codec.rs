//! WKT encoding of polygon geometries, the storage format of `polygon_geometry`.

use std::str::FromStr;

use geo_types::{Geometry, MultiPolygon};
use wkt::ToWkt;

use crate::error::GeometryError;

/// Parses WKT into a multipolygon. `POLYGON` input is promoted.
pub fn parse_wkt(text: &str) -> Result<MultiPolygon<f64>, GeometryError> {
    let parsed = wkt::Wkt::<f64>::from_str(text)
        .map_err(|e| GeometryError::WktParse(format!("{:?}", e)))?;
    let geometry: Geometry<f64> = parsed
        .try_into()
        .map_err(|e: wkt::conversion::Error| GeometryError::WktParse(format!("{:?}", e)))?;

    let multi = match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        Geometry::MultiPolygon(multi) => multi,
        other => return Err(GeometryError::Unsupported(geometry_kind(&other))),
    };

    if multi.0.is_empty() {
        return Err(GeometryError::Empty);
    }
    Ok(multi)
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
        _ => "Geometry",
    }
}

/// Encodes a multipolygon as WKT. Single-part shapes are written as `POLYGON`.
pub fn to_wkt(geom: &MultiPolygon<f64>) -> String {
    match geom.0.as_slice() {
        [single] => single.wkt_string(),
        _ => geom.wkt_string(),
    }
}
