//! SQLite-backed implementation of the store traits.
//!
//! `SqliteRepository` borrows a connection (usually an open transaction) and
//! maps the raw rows of the `*_repo` modules into domain records.

use std::collections::HashMap;

use chrono::Utc;
use geo_types::MultiPolygon;
use rusqlite::Connection;
use uuid::Uuid;

use super::criteria_repo::{self, CriteriaRow};
use super::geometry_repo::{self, GeometryRow};
use super::site_polygon_repo::{self, SitePolygonRow};
use super::{parse_uuid, site_repo, Database, DatabaseError};
use crate::error::{ClipError, Result};
use crate::geometry::{self, parse_wkt, to_wkt};
use crate::model::{
    Actor, GeometryRecord, OverlapObservation, OverlapRecord, Project, Site, SitePolygon,
    OVERLAPPING_CRITERIA_ID,
};
use crate::store::{
    CriteriaStore, GeometryStore, PolygonRepository, SiteDirectory, SitePolygonStore,
    Transactional,
};

const SAVEPOINT: &str = "clip_polygon";

pub struct SqliteRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn id_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

fn uuids(values: Vec<String>, table: &'static str) -> Result<Vec<Uuid>> {
    values
        .iter()
        .map(|v| parse_uuid(v, table).map_err(ClipError::from))
        .collect()
}

impl TryFrom<SitePolygonRow> for SitePolygon {
    type Error = DatabaseError;

    fn try_from(row: SitePolygonRow) -> std::result::Result<Self, Self::Error> {
        Ok(SitePolygon {
            id: parse_uuid(&row.id, "site_polygons")?,
            geometry_id: parse_uuid(&row.geometry_id, "site_polygons")?,
            primary_id: parse_uuid(&row.primary_id, "site_polygons")?,
            site_id: parse_uuid(&row.site_id, "site_polygons")?,
            poly_name: row.poly_name,
            version_name: row.version_name,
            is_active: row.is_active,
            calc_area_ha: row.calc_area_ha,
            created_by: row.created_by,
        })
    }
}

impl GeometryStore for SqliteRepository<'_> {
    fn fetch_geometries(&self, ids: &[Uuid]) -> Result<Vec<GeometryRecord>> {
        let rows = geometry_repo::find_by_ids(self.conn, &id_strings(ids))?;
        let mut by_id: HashMap<String, GeometryRow> =
            rows.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut records = Vec::with_capacity(by_id.len());
        for id in ids {
            let Some(row) = by_id.remove(&id.to_string()) else {
                continue;
            };
            records.push(GeometryRecord {
                id: *id,
                geometry: parse_wkt(&row.wkt)?,
                area_deg: row.area_deg,
            });
        }
        Ok(records)
    }

    fn insert_geometry(&self, geometry: &MultiPolygon<f64>) -> Result<GeometryRecord> {
        let record = GeometryRecord {
            id: Uuid::new_v4(),
            geometry: geometry.clone(),
            area_deg: geometry::area(geometry),
        };
        geometry_repo::insert(
            self.conn,
            &GeometryRow {
                id: record.id.to_string(),
                wkt: to_wkt(geometry),
                area_deg: record.area_deg,
                created_at: now(),
            },
        )?;
        Ok(record)
    }
}

impl CriteriaStore for SqliteRepository<'_> {
    fn overlap_records(&self, geometry_ids: &[Uuid]) -> Result<Vec<OverlapRecord>> {
        let rows = criteria_repo::find_active(
            self.conn,
            &id_strings(geometry_ids),
            OVERLAPPING_CRITERIA_ID,
        )?;
        // Rows come back oldest first; the newest active row wins.
        let mut latest: HashMap<String, CriteriaRow> = HashMap::new();
        for row in rows {
            latest.insert(row.geometry_id.clone(), row);
        }

        let mut records = Vec::with_capacity(latest.len());
        for id in geometry_ids {
            let Some(row) = latest.remove(&id.to_string()) else {
                continue;
            };
            records.push(OverlapRecord {
                geometry_id: *id,
                observations: criteria_repo::decode_overlaps(row.extra_info.as_deref()),
            });
        }
        Ok(records)
    }

    fn save_overlaps(&self, geometry_id: Uuid, observations: &[OverlapObservation]) -> Result<()> {
        let timestamp = now();
        let geometry_id = geometry_id.to_string();
        criteria_repo::retire_active(self.conn, &geometry_id, OVERLAPPING_CRITERIA_ID, &timestamp)?;
        criteria_repo::insert(
            self.conn,
            &CriteriaRow {
                id: 0,
                geometry_id,
                criteria_id: OVERLAPPING_CRITERIA_ID,
                valid: observations.is_empty(),
                extra_info: Some(criteria_repo::encode_overlaps(observations)),
                created_at: timestamp,
                retired_at: None,
            },
        )?;
        Ok(())
    }

    fn retire_overlaps(&self, geometry_id: Uuid) -> Result<()> {
        criteria_repo::retire_active(
            self.conn,
            &geometry_id.to_string(),
            OVERLAPPING_CRITERIA_ID,
            &now(),
        )?;
        Ok(())
    }
}

impl SitePolygonStore for SqliteRepository<'_> {
    fn active_version_for_geometry(&self, geometry_id: Uuid) -> Result<Option<SitePolygon>> {
        let Some(row) = site_polygon_repo::find_by_geometry_id(self.conn, &geometry_id.to_string())?
        else {
            return Ok(None);
        };
        if row.is_active {
            return Ok(Some(SitePolygon::try_from(row)?));
        }
        let active = site_polygon_repo::find_active_by_primary(self.conn, &row.primary_id)?;
        Ok(active.map(SitePolygon::try_from).transpose()?)
    }

    fn create_version(
        &self,
        previous: &SitePolygon,
        geometry_id: Uuid,
        area_ha: f64,
        actor: &Actor,
    ) -> Result<SitePolygon> {
        let timestamp = now();
        let changed = site_polygon_repo::deactivate(self.conn, &previous.id.to_string(), &timestamp)?;
        if changed == 0 {
            return Err(ClipError::Internal(format!(
                "site polygon {} is no longer the active version",
                previous.id
            )));
        }

        let version = SitePolygon {
            id: Uuid::new_v4(),
            geometry_id,
            primary_id: previous.primary_id,
            site_id: previous.site_id,
            poly_name: previous.poly_name.clone(),
            version_name: Some(format!(
                "{} (clipped {})",
                previous.display_name(),
                Utc::now().format("%Y-%m-%d")
            )),
            is_active: true,
            calc_area_ha: Some(area_ha),
            created_by: Some(actor.id.clone()),
        };
        site_polygon_repo::insert(
            self.conn,
            &SitePolygonRow {
                id: version.id.to_string(),
                geometry_id: version.geometry_id.to_string(),
                primary_id: version.primary_id.to_string(),
                site_id: version.site_id.to_string(),
                poly_name: version.poly_name.clone(),
                version_name: version.version_name.clone(),
                is_active: true,
                calc_area_ha: version.calc_area_ha,
                created_by: version.created_by.clone(),
                created_at: timestamp.clone(),
                updated_at: timestamp,
            },
        )?;
        Ok(version)
    }

    fn active_geometry_ids_for_site(&self, site_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = site_polygon_repo::active_geometry_ids_for_site(self.conn, &site_id.to_string())?;
        uuids(ids, "site_polygons")
    }

    fn active_geometry_ids_for_project(&self, project_id: Uuid) -> Result<Vec<Uuid>> {
        let ids =
            site_polygon_repo::active_geometry_ids_for_project(self.conn, &project_id.to_string())?;
        uuids(ids, "site_polygons")
    }

    fn sites_for_geometries(&self, geometry_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>> {
        site_polygon_repo::sites_for_geometries(self.conn, &id_strings(geometry_ids))?
            .into_iter()
            .map(|(geometry, site)| -> Result<(Uuid, Uuid)> {
                Ok((
                    parse_uuid(&geometry, "site_polygons")?,
                    parse_uuid(&site, "site_polygons")?,
                ))
            })
            .collect()
    }
}

impl SiteDirectory for SqliteRepository<'_> {
    fn site(&self, id: Uuid) -> Result<Option<Site>> {
        let Some(row) = site_repo::find_site(self.conn, &id.to_string())? else {
            return Ok(None);
        };
        Ok(Some(Site {
            id: parse_uuid(&row.id, "sites")?,
            project_id: row
                .project_id
                .as_deref()
                .map(|p| parse_uuid(p, "sites"))
                .transpose()?,
            name: row.name,
        }))
    }

    fn project(&self, id: Uuid) -> Result<Option<Project>> {
        let Some(row) = site_repo::find_project(self.conn, &id.to_string())? else {
            return Ok(None);
        };
        Ok(Some(Project {
            id: parse_uuid(&row.id, "projects")?,
            name: row.name,
        }))
    }
}

impl PolygonRepository for SqliteRepository<'_> {
    fn within_savepoint(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        self.conn
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
            .map_err(DatabaseError::from)?;
        match f() {
            Ok(()) => {
                self.conn
                    .execute_batch(&format!("RELEASE SAVEPOINT {SAVEPOINT}"))
                    .map_err(DatabaseError::from)?;
                Ok(())
            }
            Err(e) => {
                self.conn
                    .execute_batch(&format!(
                        "ROLLBACK TO SAVEPOINT {SAVEPOINT}; RELEASE SAVEPOINT {SAVEPOINT}"
                    ))
                    .map_err(DatabaseError::from)?;
                Err(e)
            }
        }
    }
}

impl Transactional for Database {
    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn PolygonRepository) -> Result<T>,
    {
        self.transaction(|conn| f(&SqliteRepository::new(conn)))
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn PolygonRepository) -> Result<T>,
    {
        self.with_conn(|conn| f(&SqliteRepository::new(conn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::site_repo::{ProjectRow, SiteRow};
    use geo_types::polygon;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    struct Seeded {
        site: Uuid,
        project: Uuid,
        version: SitePolygon,
    }

    fn seed(repo: &SqliteRepository<'_>) -> Seeded {
        let project = Uuid::new_v4();
        let site = Uuid::new_v4();
        site_repo::insert_project(
            repo.conn,
            &ProjectRow {
                id: project.to_string(),
                name: "Greenbelt".into(),
            },
        )
        .unwrap();
        site_repo::insert_site(
            repo.conn,
            &SiteRow {
                id: site.to_string(),
                project_id: Some(project.to_string()),
                name: "Riverside".into(),
            },
        )
        .unwrap();

        let geometry = repo.insert_geometry(&square(0.0, 0.0, 0.001)).unwrap();
        let version = SitePolygon {
            id: Uuid::new_v4(),
            geometry_id: geometry.id,
            primary_id: Uuid::new_v4(),
            site_id: site,
            poly_name: Some("Plot 1".into()),
            version_name: None,
            is_active: true,
            calc_area_ha: Some(1.2),
            created_by: None,
        };
        site_polygon_repo::insert(
            repo.conn,
            &SitePolygonRow {
                id: version.id.to_string(),
                geometry_id: version.geometry_id.to_string(),
                primary_id: version.primary_id.to_string(),
                site_id: site.to_string(),
                poly_name: version.poly_name.clone(),
                version_name: None,
                is_active: true,
                calc_area_ha: version.calc_area_ha,
                created_by: None,
                created_at: now(),
                updated_at: now(),
            },
        )
        .unwrap();
        Seeded {
            site,
            project,
            version,
        }
    }

    #[test]
    fn test_fetch_geometries_in_request_order() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteRepository::new(conn);
            let a = repo.insert_geometry(&square(0.0, 0.0, 1.0))?;
            let b = repo.insert_geometry(&square(5.0, 5.0, 2.0))?;

            let fetched = repo.fetch_geometries(&[b.id, Uuid::new_v4(), a.id])?;
            assert_eq!(fetched.len(), 2);
            assert_eq!(fetched[0].id, b.id);
            assert_eq!(fetched[1].id, a.id);
            assert!((fetched[0].area_deg - 4.0).abs() < 1e-9);
            Ok::<_, ClipError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_save_overlaps_replaces_active_record() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteRepository::new(conn);
            let g = Uuid::new_v4();
            let observation = OverlapObservation {
                counterpart: Uuid::new_v4(),
                counterpart_name: Some("East".into()),
                percentage: 2.5,
                area_ha: 0.05,
            };
            repo.save_overlaps(g, std::slice::from_ref(&observation))?;
            repo.save_overlaps(g, &[])?;

            let records = repo.overlap_records(&[g])?;
            assert_eq!(records.len(), 1);
            assert!(records[0].observations.is_empty());

            let active = criteria_repo::find_active(conn, &[g.to_string()], OVERLAPPING_CRITERIA_ID)?;
            assert_eq!(active.len(), 1);
            assert!(active[0].valid);

            repo.retire_overlaps(g)?;
            assert!(repo.overlap_records(&[g])?.is_empty());
            Ok::<_, ClipError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_create_version_moves_active_flag() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteRepository::new(conn);
            let seeded = seed(&repo);
            let clipped = repo.insert_geometry(&square(0.0, 0.0, 0.0009))?;

            let version =
                repo.create_version(&seeded.version, clipped.id, 0.9, &Actor::editor("u-1"))?;
            assert_eq!(version.primary_id, seeded.version.primary_id);
            assert_eq!(version.created_by.as_deref(), Some("u-1"));
            assert!(version.version_name.unwrap().starts_with("Plot 1 (clipped "));

            // The old geometry now resolves to the new active version.
            let active = repo
                .active_version_for_geometry(seeded.version.geometry_id)?
                .unwrap();
            assert_eq!(active.id, version.id);
            assert_eq!(repo.active_geometry_ids_for_site(seeded.site)?, vec![clipped.id]);
            assert_eq!(
                repo.active_geometry_ids_for_project(seeded.project)?,
                vec![clipped.id]
            );

            // A stale previous version cannot be superseded twice.
            assert!(repo
                .create_version(&seeded.version, clipped.id, 0.9, &Actor::editor("u-1"))
                .is_err());
            Ok::<_, ClipError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_savepoint_discards_failed_writes_only() {
        let db = Database::open_in_memory().unwrap();
        let outcome = db.in_transaction(|repo| {
            let kept = repo.insert_geometry(&square(0.0, 0.0, 1.0))?;
            let mut dropped = None;
            let result = repo.within_savepoint(&mut || {
                dropped = Some(repo.insert_geometry(&square(3.0, 3.0, 1.0))?.id);
                Err(ClipError::Internal("boom".into()))
            });
            assert!(result.is_err());
            Ok((kept.id, dropped))
        });
        let (kept, dropped) = outcome.unwrap();

        let found = db
            .read(|repo| {
                let ids: Vec<Uuid> = dropped.into_iter().chain([kept]).collect();
                repo.fetch_geometries(&ids)
            })
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, kept);
    }

    #[test]
    fn test_in_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let mut inserted = None;
        let result: Result<()> = db.in_transaction(|repo| {
            inserted = Some(repo.insert_geometry(&square(0.0, 0.0, 1.0))?.id);
            Err(ClipError::Internal("abort".into()))
        });
        assert!(result.is_err());

        let id = inserted.unwrap();
        let found = db.read(|repo| repo.fetch_geometries(&[id])).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_site_directory_and_site_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let repo = SqliteRepository::new(conn);
            let seeded = seed(&repo);

            let site = repo.site(seeded.site)?.unwrap();
            assert_eq!(site.name, "Riverside");
            assert_eq!(site.project_id, Some(seeded.project));
            assert_eq!(repo.project(seeded.project)?.unwrap().name, "Greenbelt");
            assert!(repo.site(Uuid::new_v4())?.is_none());

            let pairs = repo.sites_for_geometries(&[seeded.version.geometry_id])?;
            assert_eq!(pairs, vec![(seeded.version.geometry_id, seeded.site)]);
            Ok::<_, ClipError>(())
        })
        .unwrap();
    }
}
