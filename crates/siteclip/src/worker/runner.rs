//! Runs one clip job from `running` to a terminal state.

use std::sync::Arc;

use tracing::{info, info_span, warn};

use super::job::{ClipJob, JobOutcome};
use crate::broadcast::JobEvent;
use crate::clipping::{ProgressReporter, VersioningWorkflow};
use crate::notify::{JobNotification, Notifier};
use crate::store::Transactional;

pub const NO_POLYGONS_MESSAGE: &str = "No polygon UUIDs supplied";
pub const NOTHING_CLIPPED_MESSAGE: &str = "No fixable overlaps found for the supplied polygons";

pub struct JobRunner<T: Transactional> {
    db: T,
    workflow: Arc<VersioningWorkflow>,
    notifier: Arc<dyn Notifier>,
}

impl<T: Transactional> JobRunner<T> {
    pub fn new(db: T, workflow: Arc<VersioningWorkflow>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            workflow,
            notifier,
        }
    }

    /// Executes `job`, reporting every state change to `progress`. Errors
    /// become a failed outcome; this never returns early.
    pub fn run(&self, job: &ClipJob, progress: &dyn ProgressReporter) -> JobOutcome {
        let span = info_span!("clip_job", job_id = %job.id, entity = %job.meta.entity_label);
        let _guard = span.enter();

        let outcome = self.execute(job, progress);
        match &outcome {
            JobOutcome::Succeeded { results, .. } => {
                info!(clipped = results.len(), "job succeeded");
                progress.report(JobEvent::Succeeded {
                    payload: results.clone(),
                });
            }
            JobOutcome::Failed {
                status, message, ..
            } => {
                warn!(status, message = %message, "job failed");
                progress.report(JobEvent::Failed {
                    status: *status,
                    message: message.clone(),
                });
            }
        }

        if let Err(e) = self
            .notifier
            .notify(&JobNotification::from_outcome(job, &outcome))
        {
            warn!(error = %e, "completion notification failed");
        }
        outcome
    }

    fn execute(&self, job: &ClipJob, progress: &dyn ProgressReporter) -> JobOutcome {
        if job.polygon_ids.is_empty() {
            return JobOutcome::Failed {
                job_id: job.id.clone(),
                status: 400,
                message: NO_POLYGONS_MESSAGE.to_string(),
            };
        }

        progress.report(JobEvent::Started {
            total: job.polygon_ids.len(),
        });

        match self.workflow.clip_and_version(
            &self.db,
            &job.polygon_ids,
            &job.actor,
            &job.meta,
            progress,
        ) {
            Ok(results) if results.is_empty() => JobOutcome::Failed {
                job_id: job.id.clone(),
                status: 404,
                message: NOTHING_CLIPPED_MESSAGE.to_string(),
            },
            Ok(results) => JobOutcome::Succeeded {
                job_id: job.id.clone(),
                results,
            },
            Err(e) => JobOutcome::Failed {
                job_id: job.id.clone(),
                status: e.status_code(),
                message: e.to_string(),
            },
        }
    }
}
