//! Best-effort notifications sent when a clip job finishes.

pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::broadcast::JobStatus;
use crate::config::NotificationConfig;
use crate::error::NotifyError;
use crate::worker::{ClipJob, JobOutcome};

pub use webhook::WebhookNotifier;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobNotification {
    pub job_id: String,
    pub entity_label: String,
    pub created_by: String,
    pub status: JobStatus,
    pub clipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl JobNotification {
    pub fn from_outcome(job: &ClipJob, outcome: &JobOutcome) -> Self {
        let error = match outcome {
            JobOutcome::Failed { message, .. } => Some(message.clone()),
            JobOutcome::Succeeded { .. } => None,
        };
        Self {
            job_id: job.id.clone(),
            entity_label: job.meta.entity_label.clone(),
            created_by: job.actor.id.clone(),
            status: outcome.status(),
            clipped: outcome.clipped(),
            error,
            completed_at: Utc::now(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &JobNotification) -> Result<(), NotifyError>;
}

/// Writes the notification to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &JobNotification) -> Result<(), NotifyError> {
        tracing::info!(
            job_id = %notification.job_id,
            entity = %notification.entity_label,
            created_by = %notification.created_by,
            status = %notification.status,
            clipped = notification.clipped,
            error = notification.error.as_deref().unwrap_or(""),
            "clip job finished"
        );
        Ok(())
    }
}

/// Builds the notifier selected by `config`: a webhook when a URL is set,
/// otherwise the log.
pub fn from_config(config: &NotificationConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.webhook_url.as_deref() {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
