//! Submission surface: validates clip requests, resolves their targets and
//! either clips inline or queues a job.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broadcast::{
    JobEvent, JobListResponse, JobProgressBroadcaster, JobProgressEvent, JobQueryParams,
    JobStatus, JobStore, StoredJob,
};
use crate::clipping::{
    fixable_ids, Clipper, NoopProgress, OverlapClassifier, VersioningWorkflow,
};
use crate::config::ClipConfig;
use crate::db::Database;
use crate::error::{ClipError, ConfigError, Result};
use crate::geometry::FeatureCollection;
use crate::model::{Actor, BatchMeta, ClippedVersionResult};
use crate::notify::{self, Notifier};
use crate::store::{PolygonRepository, Transactional};
use crate::worker::runner::{NOTHING_CLIPPED_MESSAGE, NO_POLYGONS_MESSAGE};
use crate::worker::{ClipJob, JobRunner, WorkerPool};

/// What to clip. Exactly one of the fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipRequest {
    /// Clip every fixable overlap within this site.
    #[serde(default)]
    pub site: Option<Uuid>,
    /// Clip every fixable overlap within the project containing this site.
    #[serde(default)]
    pub project_of_site: Option<Uuid>,
    #[serde(default)]
    pub polygons: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClipTarget {
    Site(Uuid),
    ProjectOfSite(Uuid),
    Polygons(Vec<Uuid>),
}

impl ClipRequest {
    pub fn for_site(site: Uuid) -> Self {
        Self {
            site: Some(site),
            ..Default::default()
        }
    }

    pub fn for_project_of_site(site: Uuid) -> Self {
        Self {
            project_of_site: Some(site),
            ..Default::default()
        }
    }

    pub fn for_polygons<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            polygons: Some(ids.into_iter().map(|id| id.to_string()).collect()),
            ..Default::default()
        }
    }

    /// Validates the request shape without touching storage.
    pub fn target(&self) -> Result<ClipTarget> {
        match (self.site, self.project_of_site, &self.polygons) {
            (Some(_), Some(_), _) => Err(ClipError::BadRequest(
                "Specify either a site or a project, not both".into(),
            )),
            (Some(_), None, Some(_)) | (None, Some(_), Some(_)) => Err(ClipError::BadRequest(
                "A polygon list cannot be combined with a site or project".into(),
            )),
            (Some(site), None, None) => Ok(ClipTarget::Site(site)),
            (None, Some(site), None) => Ok(ClipTarget::ProjectOfSite(site)),
            (None, None, Some(ids)) => parse_polygon_ids(ids).map(ClipTarget::Polygons),
            (None, None, None) => Err(ClipError::BadRequest(
                "No site, project or polygon list supplied".into(),
            )),
        }
    }
}

fn parse_polygon_ids(raw: &[String]) -> Result<Vec<Uuid>> {
    if raw.is_empty() {
        return Err(ClipError::BadRequest(NO_POLYGONS_MESSAGE.into()));
    }
    let mut seen = HashSet::with_capacity(raw.len());
    let mut ids = Vec::with_capacity(raw.len());
    for value in raw {
        let value = value.trim();
        if value.is_empty() {
            return Err(ClipError::BadRequest("Empty polygon UUID supplied".into()));
        }
        let id = Uuid::parse_str(value)
            .map_err(|_| ClipError::BadRequest(format!("Invalid polygon UUID '{}'", value)))?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Response to a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// A single candidate, clipped inline.
    Completed(ClippedVersionResult),
    Queued { job_id: String, status: JobStatus },
}

pub struct ClipService {
    db: Database,
    workflow: Arc<VersioningWorkflow>,
    pool: WorkerPool,
    jobs: Arc<JobStore>,
    broadcaster: JobProgressBroadcaster,
    job_ttl: chrono::Duration,
}

impl ClipService {
    pub fn new(db: Database, config: &ClipConfig, notifier: Arc<dyn Notifier>) -> Self {
        let workflow = Arc::new(VersioningWorkflow::new(
            OverlapClassifier::new(config.thresholds),
            Clipper::new(config.buffer_epsilon),
            config.batch_size,
        ));
        let jobs = Arc::new(JobStore::with_database(db.clone()));
        let broadcaster = JobProgressBroadcaster::default();
        let runner = Arc::new(JobRunner::new(db.clone(), Arc::clone(&workflow), notifier));
        let pool = WorkerPool::new(
            runner,
            config.worker_count.max(1),
            Some((broadcaster.clone(), Arc::clone(&jobs))),
        );

        Self {
            db,
            workflow,
            pool,
            jobs,
            broadcaster,
            job_ttl: config.job_ttl(),
        }
    }

    /// Opens the configured database and notifier.
    pub fn from_config(config: &ClipConfig) -> Result<Self> {
        let path = config.database_path().ok_or_else(|| {
            ClipError::Internal("no database path configured and no home directory".into())
        })?;
        let db = Database::open(&path)?;
        let notifier = notify::from_config(&config.notifications).map_err(|e| {
            ConfigError::Validation {
                message: e.to_string(),
            }
        })?;
        Ok(Self::new(db, config, notifier))
    }

    pub fn submit(&self, actor: &Actor, request: &ClipRequest) -> Result<Submission> {
        let target = request.target()?;
        authorize(actor)?;

        let candidates = self.candidates(&target)?;
        let label = self.entity_label(&candidates)?;
        debug!(candidates = candidates.len(), entity = %label, "clip request accepted");

        if let [only] = candidates.as_slice() {
            let results = self.workflow.clip_and_version(
                &self.db,
                &[*only],
                actor,
                &BatchMeta::new(label),
                &NoopProgress,
            )?;
            return results
                .into_iter()
                .next()
                .map(Submission::Completed)
                .ok_or_else(|| ClipError::NotFound(NOTHING_CLIPPED_MESSAGE.into()));
        }

        let job = ClipJob::new(candidates, actor.clone(), BatchMeta::new(label));
        let queued = JobProgressEvent::new(
            &job.id,
            job.entity_label(),
            Some(&actor.id),
            JobEvent::Queued,
        );
        self.jobs.update_and_persist(&queued);
        self.broadcaster.send(queued);

        let job_id = job.id.clone();
        info!(job_id = %job_id, polygons = job.polygon_ids.len(), "clip job queued");
        self.pool.submit(job)?;
        Ok(Submission::Queued {
            job_id,
            status: JobStatus::Pending,
        })
    }

    /// Clipped shapes the request would produce, without persisting.
    pub fn preview(&self, actor: &Actor, request: &ClipRequest) -> Result<FeatureCollection> {
        let target = request.target()?;
        authorize(actor)?;
        let batch_size = self.workflow.batch_size();
        let ids = self.db.read(|repo| resolve_target(repo, &target, batch_size))?;
        self.workflow.preview(&self.db, &ids)
    }

    pub fn job(&self, job_id: &str) -> Result<StoredJob> {
        self.jobs
            .get_with_fallback(job_id)
            .ok_or_else(|| ClipError::NotFound(format!("Job {} not found", job_id)))
    }

    /// The payload of a succeeded job. A failed job surfaces its failure.
    pub fn job_result(&self, job_id: &str) -> Result<Vec<ClippedVersionResult>> {
        let job = self.job(job_id)?;
        match job.status {
            JobStatus::Succeeded => Ok(job.payload.unwrap_or_default()),
            JobStatus::Failed => {
                let error = job.error.unwrap_or(crate::broadcast::JobError {
                    status: 500,
                    message: "job failed".into(),
                });
                Err(ClipError::JobFailure {
                    status: error.status,
                    message: error.message,
                })
            }
            JobStatus::Pending | JobStatus::Running => Err(ClipError::NotFound(format!(
                "Job {} has not finished",
                job_id
            ))),
        }
    }

    /// Polls until `job_id` reaches a terminal state or `timeout` passes.
    pub fn wait_for_job(&self, job_id: &str, timeout: Duration) -> Result<StoredJob> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.job(job_id)?;
            if job.is_finished() || Instant::now() >= deadline {
                return Ok(job);
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn list_jobs(&self, params: &JobQueryParams) -> Result<JobListResponse> {
        Ok(self.jobs.query(params)?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    /// Removes finished jobs older than the configured TTL.
    pub fn purge_expired(&self) -> Result<usize> {
        Ok(self.jobs.purge_expired(self.job_ttl)?)
    }

    /// Stops the workers. Jobs still queued are not run.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
    }

    /// Fixable polygons of the target, in target order.
    fn candidates(&self, target: &ClipTarget) -> Result<Vec<Uuid>> {
        let classifier = self.workflow.classifier();
        let batch_size = self.workflow.batch_size();
        let candidates = self.db.read(|repo| {
            let ids = resolve_target(repo, target, batch_size)?;
            let mut pairs = Vec::new();
            for chunk in ids.chunks(batch_size) {
                pairs.extend(classifier.classify(repo, chunk)?);
            }
            Ok(fixable_ids(&ids, &pairs))
        })?;
        if candidates.is_empty() {
            return Err(ClipError::NotFound(NOTHING_CLIPPED_MESSAGE.into()));
        }
        Ok(candidates)
    }

    /// Site name when every polygon shares one site, project name when they
    /// share one project, otherwise "N polygons".
    fn entity_label(&self, polygon_ids: &[Uuid]) -> Result<String> {
        let fallback = format!("{} polygons", polygon_ids.len());
        let batch_size = self.workflow.batch_size();
        self.db.read(|repo| {
            let mut sites = BTreeSet::new();
            for chunk in polygon_ids.chunks(batch_size) {
                sites.extend(repo.sites_for_geometries(chunk)?.into_iter().map(|(_, site)| site));
            }
            if let [site_id] = sites.iter().copied().collect::<Vec<_>>().as_slice() {
                if let Some(site) = repo.site(*site_id)? {
                    return Ok(site.name);
                }
            }
            if sites.is_empty() {
                return Ok(fallback);
            }

            let mut projects = BTreeSet::new();
            for site_id in &sites {
                match repo.site(*site_id)?.and_then(|site| site.project_id) {
                    Some(project) => {
                        projects.insert(project);
                    }
                    None => return Ok(fallback),
                }
            }
            if let [project_id] = projects.iter().copied().collect::<Vec<_>>().as_slice() {
                if let Some(project) = repo.project(*project_id)? {
                    return Ok(project.name);
                }
            }
            Ok(fallback)
        })
    }
}

fn authorize(actor: &Actor) -> Result<()> {
    if actor.can_edit_polygons {
        Ok(())
    } else {
        Err(ClipError::Unauthorized(format!(
            "user {} may not edit site polygons",
            actor.id
        )))
    }
}

fn resolve_target(
    repo: &dyn PolygonRepository,
    target: &ClipTarget,
    batch_size: usize,
) -> Result<Vec<Uuid>> {
    match target {
        ClipTarget::Site(site_id) => {
            repo.site(*site_id)?
                .ok_or_else(|| ClipError::NotFound(format!("Site {} not found", site_id)))?;
            repo.active_geometry_ids_for_site(*site_id)
        }
        ClipTarget::ProjectOfSite(site_id) => {
            let site = repo
                .site(*site_id)?
                .ok_or_else(|| ClipError::NotFound(format!("Site {} not found", site_id)))?;
            let project_id = site.project_id.ok_or_else(|| {
                ClipError::NotFound(format!("Site {} does not belong to a project", site_id))
            })?;
            repo.project(project_id)?.ok_or_else(|| {
                ClipError::NotFound(format!("Project {} not found", project_id))
            })?;
            repo.active_geometry_ids_for_project(project_id)
        }
        ClipTarget::Polygons(ids) => {
            let mut found = HashSet::with_capacity(ids.len());
            for chunk in ids.chunks(batch_size) {
                found.extend(repo.fetch_geometries(chunk)?.into_iter().map(|record| record.id));
            }
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(Uuid::to_string)
                .collect();
            if !missing.is_empty() {
                return Err(ClipError::NotFound(format!(
                    "Polygons not found: {}",
                    missing.join(", ")
                )));
            }
            Ok(ids.clone())
        }
    }
}
