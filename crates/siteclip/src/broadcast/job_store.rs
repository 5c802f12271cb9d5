//! Job store with persistent database storage.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broadcast::job_progress::{JobEvent, JobProgressEvent, JobStatus};
use crate::db::job_repo::{self, ClipJobRow, JobFilter};
use crate::db::{Database, DatabaseError};
use crate::model::ClippedVersionResult;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_status(s: &str, job_id: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "running" => JobStatus::Running,
        "succeeded" => JobStatus::Succeeded,
        "failed" => JobStatus::Failed,
        other => {
            log::warn!(
                "Unknown job status '{}' for job {}, defaulting to Running",
                other,
                job_id
            );
            JobStatus::Running
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

// ─── StoredJob ──────────────────────────────────────────────────────────────

/// Terminal failure details of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub status: u16,
    pub message: String,
}

/// A stored job with its latest state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredJob {
    pub job_id: String,
    pub status: JobStatus,
    pub entity_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub total_content: usize,
    pub processed_content: usize,
    /// Current step message.
    pub progress_message: String,
    /// Clipped versions, set on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Vec<ClippedVersionResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StoredJob {
    /// Creates a new stored job from a progress event.
    pub fn from_event(event: &JobProgressEvent) -> Self {
        let mut job = Self {
            job_id: event.job_id.clone(),
            status: JobStatus::Pending,
            entity_label: event.entity_label.clone(),
            created_by: event.created_by.clone(),
            total_content: 0,
            processed_content: 0,
            progress_message: String::new(),
            payload: None,
            error: None,
            created_at: event.timestamp,
            updated_at: event.timestamp,
            completed_at: None,
        };
        job.update_from_event(event);
        job
    }

    /// Creates a StoredJob from a database row.
    pub fn from_job_row(row: &ClipJobRow) -> Self {
        let payload = row.payload.as_deref().and_then(|raw| {
            serde_json::from_str::<Vec<ClippedVersionResult>>(raw)
                .map_err(|e| log::warn!("Job {} has an unreadable payload: {}", row.id, e))
                .ok()
        });
        let error = match (row.error_status, &row.error_message) {
            (Some(status), Some(message)) => Some(JobError {
                status: u16::try_from(status).unwrap_or(500),
                message: message.clone(),
            }),
            _ => None,
        };

        Self {
            job_id: row.id.clone(),
            status: parse_status(&row.status, &row.id),
            entity_label: row.entity_label.clone(),
            created_by: row.created_by.clone(),
            total_content: count(row.total_content),
            processed_content: count(row.processed_content),
            progress_message: row.progress_message.clone().unwrap_or_default(),
            payload,
            error,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
            completed_at: row.completed_at.as_deref().map(parse_timestamp),
        }
    }

    fn to_job_row(&self) -> ClipJobRow {
        ClipJobRow {
            id: self.job_id.clone(),
            status: self.status.as_str().to_string(),
            entity_label: self.entity_label.clone(),
            created_by: self.created_by.clone(),
            total_content: self.total_content as i64,
            processed_content: self.processed_content as i64,
            progress_message: Some(self.progress_message.clone()),
            payload: self
                .payload
                .as_ref()
                .and_then(|p| serde_json::to_string(p).ok()),
            error_status: self.error.as_ref().map(|e| i64::from(e.status)),
            error_message: self.error.as_ref().map(|e| e.message.clone()),
            created_at: format_timestamp(self.created_at),
            updated_at: format_timestamp(self.updated_at),
            completed_at: self.completed_at.map(format_timestamp),
        }
    }

    /// Updates the job from a progress event.
    pub fn update_from_event(&mut self, event: &JobProgressEvent) {
        self.status = event.status();
        self.progress_message = event.event.message();
        self.updated_at = event.timestamp;

        match &event.event {
            JobEvent::Queued => {}
            JobEvent::Started { total } => {
                self.total_content = *total;
                self.processed_content = 0;
            }
            JobEvent::Progress {
                processed, total, ..
            } => {
                self.total_content = *total;
                self.processed_content = *processed;
            }
            JobEvent::Succeeded { payload } => {
                self.processed_content = self.total_content;
                self.payload = Some(payload.clone());
            }
            JobEvent::Failed { status, message } => {
                self.error = Some(JobError {
                    status: *status,
                    message: message.clone(),
                });
            }
        }

        if self.status.is_terminal() {
            self.completed_at = Some(event.timestamp);
        }
    }

    /// Returns true if this job is finished (succeeded or failed).
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

// ─── Query types ────────────────────────────────────────────────────────────

/// Query parameters for job listing.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQueryParams {
    pub status: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Response for job listing with pagination.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListResponse {
    pub jobs: Vec<StoredJob>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Job store backed by an in-memory cache and, when set, rusqlite.
///
/// Uses `std::sync::RwLock` for both database handle and cache.
pub struct JobStore {
    /// Database handle (clones share the inner `Arc`).
    db: RwLock<Option<Database>>,
    /// In-memory cache for real-time updates.
    cache: RwLock<HashMap<String, StoredJob>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            db: RwLock::new(None),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a store that persists into `db`.
    pub fn with_database(db: Database) -> Self {
        let store = Self::new();
        store.set_database(db);
        store
    }

    /// Sets the database connection.
    pub fn set_database(&self, db: Database) {
        let mut guard = match self.db.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store DB lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Some(db);
    }

    /// Gets a cloned database handle if available.
    pub fn get_database(&self) -> Option<Database> {
        let guard = match self.db.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store DB lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        guard.clone()
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, HashMap<String, StoredJob>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredJob>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Updates the in-memory cache with a progress event and returns the
    /// resulting job state.
    pub fn update(&self, event: &JobProgressEvent) -> StoredJob {
        let mut cache = self.write_cache();
        match cache.get_mut(&event.job_id) {
            Some(job) => {
                job.update_from_event(event);
                job.clone()
            }
            None => {
                let job = StoredJob::from_event(event);
                cache.insert(event.job_id.clone(), job.clone());
                job
            }
        }
    }

    /// Updates the cache and persists to database.
    pub fn update_and_persist(&self, event: &JobProgressEvent) {
        let job = self.update(event);

        if let Some(db) = self.get_database() {
            if let Err(e) = self.persist(&db, &job) {
                log::error!("Failed to persist job event to database: {}", e);
            }
        }
    }

    /// Writes the full job state, inserting the row on first sight.
    fn persist(&self, db: &Database, job: &StoredJob) -> Result<(), DatabaseError> {
        let row = job.to_job_row();
        if job_repo::find_by_id(db, &job.job_id)?.is_some() {
            job_repo::update(db, &row)
        } else {
            job_repo::insert(db, &row)
        }
    }

    /// Query jobs with filters and pagination.
    pub fn query(&self, params: &JobQueryParams) -> Result<JobListResponse, DatabaseError> {
        if let Some(db) = self.get_database() {
            let filter = JobFilter {
                status: params.status.clone(),
                created_by: params.created_by.clone(),
                limit: params.limit,
                offset: params.offset,
            };
            let (rows, total) = job_repo::query(&db, &filter)?;
            let jobs = rows.iter().map(StoredJob::from_job_row).collect();
            Ok(JobListResponse {
                jobs,
                total,
                limit: params.limit,
                offset: params.offset,
            })
        } else {
            Ok(self.query_cache(params))
        }
    }

    /// Falls back to querying the in-memory cache.
    fn query_cache(&self, params: &JobQueryParams) -> JobListResponse {
        let mut jobs: Vec<StoredJob> = self.read_cache().values().cloned().collect();

        if let Some(ref status) = params.status {
            jobs.retain(|j| j.status.as_str() == status);
        }
        if let Some(ref created_by) = params.created_by {
            jobs.retain(|j| j.created_by.as_deref() == Some(created_by.as_str()));
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = jobs.len() as u64;
        let offset = params.offset.unwrap_or(0) as usize;
        let limit = params.limit.unwrap_or(100) as usize;
        let jobs: Vec<StoredJob> = jobs.into_iter().skip(offset).take(limit).collect();

        JobListResponse {
            jobs,
            total,
            limit: params.limit,
            offset: params.offset,
        }
    }

    /// Returns a specific job by ID (from cache).
    pub fn get(&self, job_id: &str) -> Option<StoredJob> {
        self.read_cache().get(job_id).cloned()
    }

    /// Returns a specific job by ID, checking cache then database.
    pub fn get_with_fallback(&self, job_id: &str) -> Option<StoredJob> {
        if let Some(job) = self.get(job_id) {
            return Some(job);
        }
        let db = self.get_database()?;
        match job_repo::find_by_id(&db, job_id) {
            Ok(row) => row.as_ref().map(StoredJob::from_job_row),
            Err(e) => {
                log::error!("Failed to load job {} from database: {}", job_id, e);
                None
            }
        }
    }

    /// Drops finished jobs that completed more than `ttl` ago from the cache
    /// and the database. Returns how many database rows were removed, or the
    /// number of cache entries when no database is set.
    pub fn purge_expired(&self, ttl: chrono::Duration) -> Result<usize, DatabaseError> {
        let cutoff = Utc::now() - ttl;

        let evicted = {
            let mut cache = self.write_cache();
            let before = cache.len();
            cache.retain(|_, job| !matches!(job.completed_at, Some(done) if done < cutoff));
            before - cache.len()
        };

        match self.get_database() {
            Some(db) => {
                let deleted = job_repo::delete_completed_before(&db, &format_timestamp(cutoff))?;
                log::info!("Purged {} expired clip jobs", deleted);
                Ok(deleted)
            }
            None => Ok(evicted),
        }
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
