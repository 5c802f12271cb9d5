//! Job progress streaming and job state tracking.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{
    JobEvent, JobProgressBroadcaster, JobProgressEvent, JobProgressTracker, JobStatus,
};
pub use job_store::{JobError, JobListResponse, JobQueryParams, JobStore, StoredJob};
