//! Site and project repository.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::DatabaseError;

#[derive(Debug, Clone)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SiteRow {
    pub id: String,
    pub project_id: Option<String>,
    pub name: String,
}

impl SiteRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            project_id: row.get("project_id")?,
            name: row.get("name")?,
        })
    }
}

pub fn insert_project(conn: &Connection, project: &ProjectRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO projects (id, name) VALUES (?1, ?2)",
        params![project.id, project.name],
    )?;
    Ok(())
}

pub fn insert_site(conn: &Connection, site: &SiteRow) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO sites (id, project_id, name) VALUES (?1, ?2, ?3)",
        params![site.id, site.project_id, site.name],
    )?;
    Ok(())
}

pub fn find_site(conn: &Connection, id: &str) -> Result<Option<SiteRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM sites WHERE id = ?1",
            params![id],
            SiteRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_project(conn: &Connection, id: &str) -> Result<Option<ProjectRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name FROM projects WHERE id = ?1",
            params![id],
            |r| {
                Ok(ProjectRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
