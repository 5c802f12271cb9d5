//! Overlap classification, pairwise clipping and versioned persistence.

pub mod classifier;
pub mod orchestrator;
pub mod progress;
pub mod versioning;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{fixable_ids, pair_key, FixablePair, OverlapClassifier, PairKey};
pub use orchestrator::{ClipPlan, Clipper, Replacement};
pub use progress::{BroadcastProgress, NoopProgress, ProgressReporter, RecordingProgress};
pub use versioning::{VersioningWorkflow, DEFAULT_BATCH_SIZE};
