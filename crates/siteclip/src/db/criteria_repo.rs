//! Validation criteria repository.
//!
//! The upstream validator stores overlap observations as a JSON list in
//! `extra_info`. Decoding happens here so the rest of the crate only ever
//! sees typed [`OverlapObservation`]s.

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{placeholders, DatabaseError};
use crate::model::OverlapObservation;

/// A raw `criteria_site` row.
#[derive(Debug, Clone)]
pub struct CriteriaRow {
    pub id: i64,
    pub geometry_id: String,
    pub criteria_id: i64,
    pub valid: bool,
    pub extra_info: Option<String>,
    pub created_at: String,
    pub retired_at: Option<String>,
}

impl CriteriaRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            geometry_id: row.get("geometry_id")?,
            criteria_id: row.get("criteria_id")?,
            valid: row.get("valid")?,
            extra_info: row.get("extra_info")?,
            created_at: row.get("created_at")?,
            retired_at: row.get("retired_at")?,
        })
    }
}

/// One entry of the stored overlap list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredOverlap {
    #[serde(default)]
    poly_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    poly_name: Option<String>,
    #[serde(default)]
    percentage: Option<f64>,
    /// Hectares.
    #[serde(default)]
    intersection_area: Option<f64>,
}

impl StoredOverlap {
    fn into_observation(self) -> Option<OverlapObservation> {
        let counterpart = Uuid::parse_str(self.poly_uuid.as_deref()?.trim()).ok()?;
        Some(OverlapObservation {
            counterpart,
            counterpart_name: self.poly_name,
            percentage: self.percentage?,
            area_ha: self.intersection_area?,
        })
    }
}

/// Decodes `extra_info`. A missing or non-list payload yields no
/// observations, and entries without a usable counterpart id or figures
/// are dropped.
pub fn decode_overlaps(extra_info: Option<&str>) -> Vec<OverlapObservation> {
    let Some(raw) = extra_info else {
        return Vec::new();
    };
    let Ok(serde_json::Value::Array(entries)) = serde_json::from_str::<serde_json::Value>(raw)
    else {
        return Vec::new();
    };
    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<StoredOverlap>(entry).ok())
        .filter_map(StoredOverlap::into_observation)
        .collect()
}

pub fn encode_overlaps(observations: &[OverlapObservation]) -> String {
    let stored: Vec<StoredOverlap> = observations
        .iter()
        .map(|o| StoredOverlap {
            poly_uuid: Some(o.counterpart.to_string()),
            poly_name: o.counterpart_name.clone(),
            percentage: Some(o.percentage),
            intersection_area: Some(o.area_ha),
        })
        .collect();
    // Serializing plain structs of strings and floats cannot fail.
    serde_json::to_string(&stored).unwrap_or_else(|_| "[]".to_string())
}

pub fn insert(conn: &Connection, row: &CriteriaRow) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO criteria_site (geometry_id, criteria_id, valid, extra_info, created_at, retired_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            row.geometry_id,
            row.criteria_id,
            row.valid,
            row.extra_info,
            row.created_at,
            row.retired_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Active (not retired) rows of one criterion for the given geometries.
pub fn find_active(
    conn: &Connection,
    geometry_ids: &[String],
    criteria_id: i64,
) -> Result<Vec<CriteriaRow>, DatabaseError> {
    if geometry_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM criteria_site
         WHERE retired_at IS NULL AND criteria_id = ?{} AND geometry_id IN ({})
         ORDER BY id ASC",
        geometry_ids.len() + 1,
        placeholders(geometry_ids.len())
    );
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = geometry_ids
        .iter()
        .map(|id| Box::new(id.clone()) as Box<dyn rusqlite::types::ToSql>)
        .collect();
    values.push(Box::new(criteria_id));

    let params_ref: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_ref.as_slice(), CriteriaRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Retires the active rows of one criterion for a geometry.
pub fn retire_active(
    conn: &Connection,
    geometry_id: &str,
    criteria_id: i64,
    retired_at: &str,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE criteria_site SET retired_at = ?3
         WHERE geometry_id = ?1 AND criteria_id = ?2 AND retired_at IS NULL",
        params![geometry_id, criteria_id, retired_at],
    )?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::OVERLAPPING_CRITERIA_ID;

    #[test]
    fn test_decode_valid_entries() {
        let a = Uuid::new_v4();
        let raw = format!(
            r#"[{{"poly_uuid": "{a}", "poly_name": "East", "percentage": 2.5, "intersection_area": 0.05}}]"#
        );
        let observations = decode_overlaps(Some(&raw));
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].counterpart, a);
        assert_eq!(observations[0].counterpart_name.as_deref(), Some("East"));
        assert_eq!(observations[0].percentage, 2.5);
        assert_eq!(observations[0].area_ha, 0.05);
    }

    #[test]
    fn test_decode_drops_malformed_payloads() {
        assert!(decode_overlaps(None).is_empty());
        assert!(decode_overlaps(Some("null")).is_empty());
        assert!(decode_overlaps(Some(r#"{"poly_uuid": "x"}"#)).is_empty());
        assert!(decode_overlaps(Some("not json")).is_empty());

        let good = Uuid::new_v4();
        let raw = format!(
            r#"[
                {{"poly_uuid": null, "percentage": 1.0, "intersection_area": 0.01}},
                {{"poly_uuid": "not-a-uuid", "percentage": 1.0, "intersection_area": 0.01}},
                {{"poly_uuid": "{good}", "percentage": null, "intersection_area": 0.01}},
                "garbage",
                {{"poly_uuid": "{good}", "percentage": 1.0, "intersection_area": 0.01}}
            ]"#
        );
        let observations = decode_overlaps(Some(&raw));
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].counterpart, good);
    }

    #[test]
    fn test_encode_matches_decode_format() {
        let observation = OverlapObservation {
            counterpart: Uuid::new_v4(),
            counterpart_name: None,
            percentage: 1.25,
            area_ha: 0.02,
        };
        let raw = encode_overlaps(std::slice::from_ref(&observation));
        assert!(raw.contains("poly_uuid"));
        assert!(raw.contains("intersection_area"));
        assert_eq!(decode_overlaps(Some(&raw)), vec![observation]);
    }

    #[test]
    fn test_find_and_retire_active() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let row = CriteriaRow {
                id: 0,
                geometry_id: "g1".into(),
                criteria_id: OVERLAPPING_CRITERIA_ID,
                valid: false,
                extra_info: Some("[]".into()),
                created_at: "2026-01-01T00:00:00Z".into(),
                retired_at: None,
            };
            insert(conn, &row)?;
            insert(
                conn,
                &CriteriaRow {
                    criteria_id: 4,
                    ..row.clone()
                },
            )?;

            let active = find_active(conn, &["g1".into()], OVERLAPPING_CRITERIA_ID)?;
            assert_eq!(active.len(), 1);
            assert!(!active[0].valid);

            assert_eq!(
                retire_active(conn, "g1", OVERLAPPING_CRITERIA_ID, "2026-02-01T00:00:00Z")?,
                1
            );
            assert!(find_active(conn, &["g1".into()], OVERLAPPING_CRITERIA_ID)?.is_empty());
            assert_eq!(find_active(conn, &["g1".into()], 4)?.len(), 1);
            Ok::<_, DatabaseError>(())
        })
        .unwrap();
    }
}
