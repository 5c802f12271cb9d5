use uuid::Uuid;

use crate::broadcast::JobStatus;
use crate::model::{Actor, BatchMeta, ClippedVersionResult};

/// A queued clip batch.
#[derive(Debug, Clone)]
pub struct ClipJob {
    pub id: String,
    pub polygon_ids: Vec<Uuid>,
    pub actor: Actor,
    pub meta: BatchMeta,
}

impl ClipJob {
    pub fn new(polygon_ids: Vec<Uuid>, actor: Actor, meta: BatchMeta) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            polygon_ids,
            actor,
            meta,
        }
    }

    pub fn entity_label(&self) -> &str {
        &self.meta.entity_label
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded {
        job_id: String,
        results: Vec<ClippedVersionResult>,
    },
    Failed {
        job_id: String,
        status: u16,
        message: String,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            JobOutcome::Succeeded { job_id, .. } | JobOutcome::Failed { job_id, .. } => job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded { .. } => JobStatus::Succeeded,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }

    /// Number of clipped polygons; zero for failures.
    pub fn clipped(&self) -> usize {
        match self {
            JobOutcome::Succeeded { results, .. } => results.len(),
            JobOutcome::Failed { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_new_assigns_unique_ids() {
        let a = ClipJob::new(vec![Uuid::new_v4()], Actor::editor("u1"), BatchMeta::new("Riverside"));
        let b = ClipJob::new(vec![], Actor::editor("u1"), BatchMeta::new("Riverside"));
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
        assert_eq!(a.entity_label(), "Riverside");
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = JobOutcome::Succeeded {
            job_id: "j1".into(),
            results: vec![ClippedVersionResult::new(Uuid::nil(), "A".into(), 1.0, 0.9)],
        };
        assert!(ok.is_success());
        assert_eq!(ok.clipped(), 1);
        assert_eq!(ok.status(), JobStatus::Succeeded);

        let failed = JobOutcome::Failed {
            job_id: "j2".into(),
            status: 404,
            message: "nothing to clip".into(),
        };
        assert_eq!(failed.job_id(), "j2");
        assert_eq!(failed.clipped(), 0);
        assert_eq!(failed.status(), JobStatus::Failed);
    }
}
