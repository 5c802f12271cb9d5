pub mod job;
pub mod pool;
pub mod runner;

pub use job::{ClipJob, JobOutcome};
pub use pool::{JobTracking, WorkerPool};
pub use runner::JobRunner;

// Re-export crossbeam_channel for callers that select over pool results
pub use crossbeam_channel;
