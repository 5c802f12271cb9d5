//! GeoJSON `FeatureCollection` output for clipped polygons.

use geo_types::{LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: Value,
    pub properties: FeatureProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    pub poly_id: Uuid,
    pub poly_name: String,
}

impl Feature {
    pub fn new(poly_id: Uuid, poly_name: impl Into<String>, geom: &MultiPolygon<f64>) -> Self {
        Self {
            kind: "Feature".to_string(),
            geometry: geometry_json(geom),
            properties: FeatureProperties {
                poly_id,
                poly_name: poly_name.into(),
            },
        }
    }
}

fn ring_coords(ring: &LineString<f64>) -> Value {
    Value::Array(ring.coords().map(|c| json!([c.x, c.y])).collect())
}

fn polygon_coords(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_coords(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_coords));
    Value::Array(rings)
}

/// GeoJSON geometry object; single-part shapes become `Polygon`.
pub fn geometry_json(geom: &MultiPolygon<f64>) -> Value {
    match geom.0.as_slice() {
        [single] => json!({ "type": "Polygon", "coordinates": polygon_coords(single) }),
        parts => json!({
            "type": "MultiPolygon",
            "coordinates": Value::Array(parts.iter().map(polygon_coords).collect()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_feature_collection_shape() {
        let geom = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]]);
        let id = Uuid::new_v4();
        let collection = FeatureCollection::new(vec![Feature::new(id, "Block A", &geom)]);

        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let feature = &value["features"][0];
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert_eq!(feature["geometry"]["coordinates"][0][1], json!([1.0, 0.0]));
        assert_eq!(feature["properties"]["poly_id"], id.to_string());
        assert_eq!(feature["properties"]["poly_name"], "Block A");
    }

    #[test]
    fn test_multi_part_geometry() {
        let part = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)];
        let geom = MultiPolygon::new(vec![part.clone(), part]);
        let value = geometry_json(&geom);
        assert_eq!(value["type"], "MultiPolygon");
        assert_eq!(value["coordinates"].as_array().unwrap().len(), 2);
    }
}
