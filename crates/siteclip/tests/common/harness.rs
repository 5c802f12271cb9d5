//! Test harness for isolated test execution.
//!
//! `TestHarness` owns a temporary directory with a file-backed SQLite
//! database seeded with one project holding two sites, plus a second
//! project with a single site.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use geo_types::MultiPolygon;
use tempfile::TempDir;
use uuid::Uuid;

use siteclip::config::ClipConfig;
use siteclip::db::site_polygon_repo::{self, SitePolygonRow};
use siteclip::db::site_repo::{self, ProjectRow, SiteRow};
use siteclip::db::{Database, SqliteRepository};
use siteclip::geometry::area_hectares;
use siteclip::model::{OverlapObservation, SitePolygon};
use siteclip::notify::LogNotifier;
use siteclip::store::{CriteriaStore, GeometryStore, SitePolygonStore, Transactional};
use siteclip::{ClipError, ClipService};

pub struct TestHarness {
    temp_dir: TempDir,
    pub db_path: PathBuf,
    pub db: Database,
    pub project: Uuid,
    /// Site of `project`, named "Riverside".
    pub site: Uuid,
    /// Second site of `project`, named "Hillside".
    pub second_site: Uuid,
    /// The only site of `other_project`.
    pub other_site: Uuid,
    pub other_project: Uuid,
}

impl TestHarness {
    pub fn new() -> Self {
        siteclip::telemetry::init("warn", false);
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("data").join("siteclip.db");
        let db = Database::open(&db_path).expect("Failed to open database");

        let project = Uuid::new_v4();
        let other_project = Uuid::new_v4();
        let site = Uuid::new_v4();
        let second_site = Uuid::new_v4();
        let other_site = Uuid::new_v4();
        db.with_conn(|conn| {
            site_repo::insert_project(
                conn,
                &ProjectRow {
                    id: project.to_string(),
                    name: "Greenbelt Restoration".into(),
                },
            )?;
            site_repo::insert_project(
                conn,
                &ProjectRow {
                    id: other_project.to_string(),
                    name: "Coastal Mangroves".into(),
                },
            )?;
            for (id, project_id, name) in [
                (site, project, "Riverside"),
                (second_site, project, "Hillside"),
                (other_site, other_project, "Estuary"),
            ] {
                site_repo::insert_site(
                    conn,
                    &SiteRow {
                        id: id.to_string(),
                        project_id: Some(project_id.to_string()),
                        name: name.into(),
                    },
                )?;
            }
            Ok::<_, siteclip::db::DatabaseError>(())
        })
        .expect("Failed to seed sites");

        Self {
            temp_dir,
            db_path,
            db,
            project,
            site,
            second_site,
            other_site,
            other_project,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Adds a polygon to `site` and returns its geometry id.
    pub fn polygon(&self, site: Uuid, name: &str, geometry: MultiPolygon<f64>) -> Uuid {
        self.db
            .with_conn(|conn| {
                let record = SqliteRepository::new(conn).insert_geometry(&geometry)?;
                let now = Utc::now().to_rfc3339();
                site_polygon_repo::insert(
                    conn,
                    &SitePolygonRow {
                        id: Uuid::new_v4().to_string(),
                        geometry_id: record.id.to_string(),
                        primary_id: Uuid::new_v4().to_string(),
                        site_id: site.to_string(),
                        poly_name: Some(name.to_string()),
                        version_name: None,
                        is_active: true,
                        calc_area_ha: Some(area_hectares(&geometry)),
                        created_by: Some("digitizer".into()),
                        created_at: now.clone(),
                        updated_at: now,
                    },
                )?;
                Ok::<_, ClipError>(record.id)
            })
            .expect("Failed to insert polygon")
    }

    /// Records a validator overlap observation on both polygons.
    pub fn overlap(&self, a: Uuid, b: Uuid, percentage: f64, area_ha: f64) {
        self.db
            .with_conn(|conn| {
                let repo = SqliteRepository::new(conn);
                for (owner, counterpart) in [(a, b), (b, a)] {
                    let mut observations = repo
                        .overlap_records(&[owner])?
                        .pop()
                        .map(|record| record.observations)
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
            .expect("Failed to record overlap");
    }

    pub fn observations(&self, geometry_id: Uuid) -> Vec<OverlapObservation> {
        self.db
            .read(|repo| repo.overlap_records(&[geometry_id]))
            .expect("Failed to read overlaps")
            .pop()
            .map(|record| record.observations)
            .unwrap_or_default()
    }

    /// The active version of the lineage `geometry_id` belongs to.
    pub fn active_version(&self, geometry_id: Uuid) -> SitePolygon {
        self.db
            .read(|repo| repo.active_version_for_geometry(geometry_id))
            .expect("Failed to read version")
            .expect("No active version")
    }

    pub fn geometry(&self, geometry_id: Uuid) -> MultiPolygon<f64> {
        self.db
            .read(|repo| repo.fetch_geometries(&[geometry_id]))
            .expect("Failed to read geometry")
            .pop()
            .expect("Geometry not found")
            .geometry
    }

    /// Every version of a lineage, oldest first.
    pub fn lineage(&self, geometry_id: Uuid) -> Vec<SitePolygonRow> {
        let primary = self.active_version(geometry_id).primary_id.to_string();
        self.db
            .with_conn(|conn| site_polygon_repo::find_by_primary(conn, &primary))
            .expect("Failed to read lineage")
    }

    pub fn service(&self, config: &ClipConfig) -> ClipService {
        ClipService::new(self.db.clone(), config, Arc::new(LogNotifier))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
