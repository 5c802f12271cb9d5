//! Repository interfaces the clipping core depends on.
//!
//! The SQLite implementation lives in `db::store`; tests substitute
//! in-memory fakes for the narrow traits.

use geo_types::MultiPolygon;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    Actor, GeometryRecord, OverlapObservation, OverlapRecord, Project, Site, SitePolygon,
};

pub trait GeometryStore {
    /// Loads geometries in request order. Unknown ids are omitted.
    fn fetch_geometries(&self, ids: &[Uuid]) -> Result<Vec<GeometryRecord>>;

    /// Stores a new immutable geometry record under a fresh id.
    fn insert_geometry(&self, geometry: &MultiPolygon<f64>) -> Result<GeometryRecord>;
}

pub trait CriteriaStore {
    /// Active "overlapping" records for the given geometries, in request order.
    fn overlap_records(&self, geometry_ids: &[Uuid]) -> Result<Vec<OverlapRecord>>;

    /// Replaces the active overlap record of a geometry. The record is
    /// valid iff `observations` is empty.
    fn save_overlaps(&self, geometry_id: Uuid, observations: &[OverlapObservation]) -> Result<()>;

    /// Retires the active overlap record of a geometry, if any.
    fn retire_overlaps(&self, geometry_id: Uuid) -> Result<()>;
}

pub trait SitePolygonStore {
    /// Finds the polygon referencing `geometry_id` and returns the active
    /// version of its lineage.
    fn active_version_for_geometry(&self, geometry_id: Uuid) -> Result<Option<SitePolygon>>;

    /// Creates a new active version of `previous`'s lineage pointing at
    /// `geometry_id`, and deactivates `previous`.
    fn create_version(
        &self,
        previous: &SitePolygon,
        geometry_id: Uuid,
        area_ha: f64,
        actor: &Actor,
    ) -> Result<SitePolygon>;

    fn active_geometry_ids_for_site(&self, site_id: Uuid) -> Result<Vec<Uuid>>;

    fn active_geometry_ids_for_project(&self, project_id: Uuid) -> Result<Vec<Uuid>>;

    /// `(geometry_id, site_id)` for every active polygon among `geometry_ids`.
    fn sites_for_geometries(&self, geometry_ids: &[Uuid]) -> Result<Vec<(Uuid, Uuid)>>;
}

pub trait SiteDirectory {
    fn site(&self, id: Uuid) -> Result<Option<Site>>;

    fn project(&self, id: Uuid) -> Result<Option<Project>>;
}

/// Everything the versioning workflow touches inside one transaction.
pub trait PolygonRepository: GeometryStore + CriteriaStore + SitePolygonStore + SiteDirectory {
    /// Runs `f` so that its writes are discarded if it fails, while the
    /// surrounding transaction continues.
    fn within_savepoint(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

/// Opens transactional (or read-only) access to a [`PolygonRepository`].
pub trait Transactional: Send + Sync {
    /// Commits when `f` returns `Ok`, rolls every write back otherwise.
    fn in_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn PolygonRepository) -> Result<T>;

    /// Read access without holding a write transaction.
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn PolygonRepository) -> Result<T>;
}
