//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::ClippedVersionResult;

/// Status of a clip job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single state change of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued,
    Started {
        total: usize,
    },
    Progress {
        processed: usize,
        total: usize,
        message: String,
    },
    Succeeded {
        payload: Vec<ClippedVersionResult>,
    },
    Failed {
        status: u16,
        message: String,
    },
}

impl JobEvent {
    pub fn status(&self) -> JobStatus {
        match self {
            JobEvent::Queued => JobStatus::Pending,
            JobEvent::Started { .. } | JobEvent::Progress { .. } => JobStatus::Running,
            JobEvent::Succeeded { .. } => JobStatus::Succeeded,
            JobEvent::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Human-readable description of the event.
    pub fn message(&self) -> String {
        match self {
            JobEvent::Queued => "Job queued for processing".to_string(),
            JobEvent::Started { total } => format!("Clipping {} polygons", total),
            JobEvent::Progress { message, .. } => message.clone(),
            JobEvent::Succeeded { payload } => format!("Clipped {} polygons", payload.len()),
            JobEvent::Failed { message, .. } => message.clone(),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job identifier.
    pub job_id: String,
    /// Site name, project name or "N polygons".
    pub entity_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(flatten)]
    pub event: JobEvent,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn new(
        job_id: &str,
        entity_label: &str,
        created_by: Option<&str>,
        event: JobEvent,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            entity_label: entity_label.to_string(),
            created_by: created_by.map(|s| s.to_string()),
            event,
            timestamp: Utc::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.event.status()
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // Ignore errors - no active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for a job without emitting anything.
    pub fn tracker(
        &self,
        job_id: &str,
        entity_label: &str,
        created_by: Option<&str>,
    ) -> JobProgressTracker {
        JobProgressTracker::new(job_id, entity_label, created_by, Arc::clone(&self.sender))
    }

}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single job.
pub struct JobProgressTracker {
    job_id: String,
    entity_label: String,
    created_by: Option<String>,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_id: &str,
        entity_label: &str,
        created_by: Option<&str>,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            entity_label: entity_label.to_string(),
            created_by: created_by.map(|s| s.to_string()),
            sender,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Builds the event for this job without sending it.
    pub fn event(&self, event: JobEvent) -> JobProgressEvent {
        JobProgressEvent::new(
            &self.job_id,
            &self.entity_label,
            self.created_by.as_deref(),
            event,
        )
    }

    pub fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    /// Builds and sends an event, returning a copy.
    pub fn emit(&self, event: JobEvent) -> JobProgressEvent {
        let event = self.event(event);
        self.send(event.clone());
        event
    }
}
