//! Domain records shared by the stores, the clipping workflow and jobs.

use chrono::{DateTime, Utc};
use geo_types::MultiPolygon;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Criterion id of the "overlapping" validation check.
pub const OVERLAPPING_CRITERIA_ID: i64 = 3;

/// An immutable polygon geometry with its stored area.
#[derive(Debug, Clone)]
pub struct GeometryRecord {
    pub id: Uuid,
    pub geometry: MultiPolygon<f64>,
    /// Planar area in square degrees, as stored.
    pub area_deg: f64,
}

/// One version of a site polygon. All versions of the same conceptual
/// polygon share `primary_id`; exactly one of them is active.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePolygon {
    pub id: Uuid,
    pub geometry_id: Uuid,
    pub primary_id: Uuid,
    pub site_id: Uuid,
    pub poly_name: Option<String>,
    pub version_name: Option<String>,
    pub is_active: bool,
    pub calc_area_ha: Option<f64>,
    pub created_by: Option<String>,
}

impl SitePolygon {
    /// Name shown in results, falling back to the geometry id.
    pub fn display_name(&self) -> String {
        match self.poly_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.geometry_id.to_string(),
        }
    }
}

/// A pairwise overlap recorded by the upstream validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapObservation {
    pub counterpart: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_name: Option<String>,
    /// Overlap as a percentage of the smaller polygon's area.
    pub percentage: f64,
    pub area_ha: f64,
}

/// The active "overlapping" criteria record of one geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlapRecord {
    pub geometry_id: Uuid,
    pub observations: Vec<OverlapObservation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
}

/// Per-polygon outcome of a clip run. Areas are in hectares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClippedVersionResult {
    /// Id of the new geometry.
    pub id: Uuid,
    pub poly_name: String,
    pub original_area: f64,
    pub new_area: f64,
    pub area_removed: f64,
}

impl ClippedVersionResult {
    pub fn new(id: Uuid, poly_name: String, original_area: f64, new_area: f64) -> Self {
        Self {
            id,
            poly_name,
            original_area,
            new_area,
            area_removed: original_area - new_area,
        }
    }
}

/// The user on whose behalf a clip runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub can_edit_polygons: bool,
}

impl Actor {
    pub fn editor(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            can_edit_polygons: true,
        }
    }

    pub fn viewer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            can_edit_polygons: false,
        }
    }
}

/// Descriptive metadata attached to a clip batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMeta {
    pub entity_label: String,
    pub submitted_at: DateTime<Utc>,
}

impl BatchMeta {
    pub fn new(entity_label: impl Into<String>) -> Self {
        Self {
            entity_label: entity_label.into(),
            submitted_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_removed_is_difference() {
        let result = ClippedVersionResult::new(Uuid::new_v4(), "A".into(), 2.5, 2.25);
        assert!((result.area_removed - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ClippedVersionResult::new(Uuid::nil(), "Plot 7".into(), 1.0, 0.9);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["polyName"], "Plot 7");
        assert!(json.get("originalArea").is_some());
        assert!(json.get("newArea").is_some());
        assert!(json.get("areaRemoved").is_some());
    }

    #[test]
    fn test_display_name_falls_back_to_geometry_id() {
        let geometry_id = Uuid::new_v4();
        let mut polygon = SitePolygon {
            id: Uuid::new_v4(),
            geometry_id,
            primary_id: Uuid::new_v4(),
            site_id: Uuid::new_v4(),
            poly_name: Some("  ".into()),
            version_name: None,
            is_active: true,
            calc_area_ha: None,
            created_by: None,
        };
        assert_eq!(polygon.display_name(), geometry_id.to_string());

        polygon.poly_name = Some("North block".into());
        assert_eq!(polygon.display_name(), "North block");
    }
}
