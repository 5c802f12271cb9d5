//! In-memory geometry and criteria stores for unit tests.

use std::cell::RefCell;
use std::collections::HashMap;

use geo_types::{polygon, MultiPolygon};
use uuid::Uuid;

use crate::db::site_polygon_repo::{self, SitePolygonRow};
use crate::db::site_repo::{self, ProjectRow, SiteRow};
use crate::db::{Database, SqliteRepository};
use crate::error::{ClipError, Result};
use crate::geometry;
use crate::model::{GeometryRecord, OverlapObservation, OverlapRecord};
use crate::store::{CriteriaStore, GeometryStore};

#[derive(Default)]
pub struct MemoryStore {
    geometries: RefCell<HashMap<Uuid, MultiPolygon<f64>>>,
    overlaps: RefCell<HashMap<Uuid, Vec<OverlapObservation>>>,
}

impl MemoryStore {
    pub fn add_geometry(&self, geometry: MultiPolygon<f64>) -> Uuid {
        let id = Uuid::new_v4();
        self.geometries.borrow_mut().insert(id, geometry);
        id
    }

    pub fn set_overlaps(&self, geometry_id: Uuid, observations: Vec<OverlapObservation>) {
        self.overlaps.borrow_mut().insert(geometry_id, observations);
    }
}

impl GeometryStore for MemoryStore {
    fn fetch_geometries(&self, ids: &[Uuid]) -> Result<Vec<GeometryRecord>> {
        let geometries = self.geometries.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| {
                geometries.get(id).map(|g| GeometryRecord {
                    id: *id,
                    geometry: g.clone(),
                    area_deg: geometry::area(g),
                })
            })
            .collect())
    }

    fn insert_geometry(&self, geometry: &MultiPolygon<f64>) -> Result<GeometryRecord> {
        let id = self.add_geometry(geometry.clone());
        Ok(GeometryRecord {
            id,
            geometry: geometry.clone(),
            area_deg: geometry::area(geometry),
        })
    }
}

impl CriteriaStore for MemoryStore {
    fn overlap_records(&self, geometry_ids: &[Uuid]) -> Result<Vec<OverlapRecord>> {
        let overlaps = self.overlaps.borrow();
        Ok(geometry_ids
            .iter()
            .filter_map(|id| {
                overlaps.get(id).map(|observations| OverlapRecord {
                    geometry_id: *id,
                    observations: observations.clone(),
                })
            })
            .collect())
    }

    fn save_overlaps(&self, geometry_id: Uuid, observations: &[OverlapObservation]) -> Result<()> {
        self.set_overlaps(geometry_id, observations.to_vec());
        Ok(())
    }

    fn retire_overlaps(&self, geometry_id: Uuid) -> Result<()> {
        self.overlaps.borrow_mut().remove(&geometry_id);
        Ok(())
    }
}

/// Axis-aligned rectangle in degrees.
pub fn rect(x: f64, y: f64, width: f64, height: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x, y: y),
        (x: x + width, y: y),
        (x: x + width, y: y + height),
        (x: x, y: y + height),
        (x: x, y: y),
    ]])
}

/// An in-memory database with one project and one site.
pub struct Fixture {
    pub db: Database,
    pub project: Uuid,
    pub site: Uuid,
}

impl Fixture {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        let project = Uuid::new_v4();
        let site = Uuid::new_v4();
        db.with_conn(|conn| {
            site_repo::insert_project(
                conn,
                &ProjectRow {
                    id: project.to_string(),
                    name: "Greenbelt".into(),
                },
            )?;
            site_repo::insert_site(
                conn,
                &SiteRow {
                    id: site.to_string(),
                    project_id: Some(project.to_string()),
                    name: "Riverside".into(),
                },
            )
        })
        .unwrap();
        Self { db, project, site }
    }

    /// Stores `geometry` as the first version of a new lineage and returns
    /// the geometry id.
    pub fn polygon(&self, name: &str, geometry: MultiPolygon<f64>) -> Uuid {
        self.db
            .with_conn(|conn| {
                let record = SqliteRepository::new(conn).insert_geometry(&geometry)?;
                let now = chrono::Utc::now().to_rfc3339();
                site_polygon_repo::insert(
                    conn,
                    &SitePolygonRow {
                        id: Uuid::new_v4().to_string(),
                        geometry_id: record.id.to_string(),
                        primary_id: Uuid::new_v4().to_string(),
                        site_id: self.site.to_string(),
                        poly_name: Some(name.to_string()),
                        version_name: None,
                        is_active: true,
                        calc_area_ha: Some(geometry::area_hectares(&geometry)),
                        created_by: None,
                        created_at: now.clone(),
                        updated_at: now,
                    },
                )?;
                Ok::<_, ClipError>(record.id)
            })
            .unwrap()
    }

    /// Records the overlap on both geometries.
    pub fn overlap(&self, a: Uuid, b: Uuid, percentage: f64, area_ha: f64) {
        self.db
            .with_conn(|conn| {
                let repo = SqliteRepository::new(conn);
                for (owner, counterpart) in [(a, b), (b, a)] {
                    let mut observations = repo
                        .overlap_records(&[owner])?
                        .pop()
                        .map(|r| r.observations)
                        .unwrap_or_default();
                    observations.push(OverlapObservation {
                        counterpart,
                        counterpart_name: None,
                        percentage,
                        area_ha,
                    });
                    repo.save_overlaps(owner, &observations)?;
                }
                Ok::<_, ClipError>(())
            })
            .unwrap();
    }

    pub fn observations(&self, geometry_id: Uuid) -> Vec<OverlapObservation> {
        self.db
            .with_conn(|conn| SqliteRepository::new(conn).overlap_records(&[geometry_id]))
            .unwrap()
            .pop()
            .map(|r| r.observations)
            .unwrap_or_default()
    }
}
