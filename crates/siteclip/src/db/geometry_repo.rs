//! Geometry repository: insert and bulk lookup for `polygon_geometry`.

use rusqlite::{params, params_from_iter, Connection, Row};

use super::{placeholders, DatabaseError};

/// A raw geometry row. `wkt` is the source of truth for the shape.
#[derive(Debug, Clone)]
pub struct GeometryRow {
    pub id: String,
    pub wkt: String,
    pub area_deg: f64,
    pub created_at: String,
}

impl GeometryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            wkt: row.get("wkt")?,
            area_deg: row.get("area_deg")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub fn insert(conn: &Connection, row: &GeometryRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO polygon_geometry (id, wkt, area_deg, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![row.id, row.wkt, row.area_deg, row.created_at],
    )?;
    Ok(())
}

/// Fetches every row whose id is in `ids`. Order is unspecified.
pub fn find_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<GeometryRow>, DatabaseError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT * FROM polygon_geometry WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), GeometryRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
