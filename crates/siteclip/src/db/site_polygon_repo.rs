//! Site polygon repository: versioned references from sites to geometries.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{placeholders, DatabaseError};

/// A raw `site_polygons` row.
#[derive(Debug, Clone)]
pub struct SitePolygonRow {
    pub id: String,
    pub geometry_id: String,
    pub primary_id: String,
    pub site_id: String,
    pub poly_name: Option<String>,
    pub version_name: Option<String>,
    pub is_active: bool,
    pub calc_area_ha: Option<f64>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SitePolygonRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            geometry_id: row.get("geometry_id")?,
            primary_id: row.get("primary_id")?,
            site_id: row.get("site_id")?,
            poly_name: row.get("poly_name")?,
            version_name: row.get("version_name")?,
            is_active: row.get("is_active")?,
            calc_area_ha: row.get("calc_area_ha")?,
            created_by: row.get("created_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub fn insert(conn: &Connection, row: &SitePolygonRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO site_polygons (id, geometry_id, primary_id, site_id, poly_name,
         version_name, is_active, calc_area_ha, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.id,
            row.geometry_id,
            row.primary_id,
            row.site_id,
            row.poly_name,
            row.version_name,
            row.is_active,
            row.calc_area_ha,
            row.created_by,
            row.created_at,
            row.updated_at,
        ],
    )?;
    Ok(())
}

/// Most recent version (active or not) that references `geometry_id`.
pub fn find_by_geometry_id(
    conn: &Connection,
    geometry_id: &str,
) -> Result<Option<SitePolygonRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM site_polygons WHERE geometry_id = ?1
             ORDER BY is_active DESC, created_at DESC LIMIT 1",
            params![geometry_id],
            SitePolygonRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_active_by_primary(
    conn: &Connection,
    primary_id: &str,
) -> Result<Option<SitePolygonRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM site_polygons WHERE primary_id = ?1 AND is_active = 1",
            params![primary_id],
            SitePolygonRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_by_primary(
    conn: &Connection,
    primary_id: &str,
) -> Result<Vec<SitePolygonRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM site_polygons WHERE primary_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![primary_id], SitePolygonRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Marks a version inactive. Returns the number of rows changed.
pub fn deactivate(conn: &Connection, id: &str, updated_at: &str) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE site_polygons SET is_active = 0, updated_at = ?2 WHERE id = ?1 AND is_active = 1",
        params![id, updated_at],
    )?;
    Ok(changed)
}

pub fn active_geometry_ids_for_site(
    conn: &Connection,
    site_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT geometry_id FROM site_polygons
         WHERE site_id = ?1 AND is_active = 1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let ids = stmt
        .query_map(params![site_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

pub fn active_geometry_ids_for_project(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT sp.geometry_id FROM site_polygons sp
         JOIN sites s ON s.id = sp.site_id
         WHERE s.project_id = ?1 AND sp.is_active = 1
         ORDER BY sp.created_at ASC, sp.rowid ASC",
    )?;
    let ids = stmt
        .query_map(params![project_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// `(geometry_id, site_id)` pairs for the active versions among `geometry_ids`.
pub fn sites_for_geometries(
    conn: &Connection,
    geometry_ids: &[String],
) -> Result<Vec<(String, String)>, DatabaseError> {
    if geometry_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT geometry_id, site_id FROM site_polygons
         WHERE is_active = 1 AND geometry_id IN ({})",
        placeholders(geometry_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let pairs = stmt
        .query_map(params_from_iter(geometry_ids.iter()), |r| {
            Ok((r.get(0)?, r.get(1)?))
        })?
        .collect::<Result<Vec<(String, String)>, _>>()?;
    Ok(pairs)
}
