pub mod broadcast;
pub mod clipping;
pub mod config;
pub mod db;
pub mod error;
pub mod geometry;
pub mod model;
pub mod notify;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use broadcast::{JobEvent, JobProgressBroadcaster, JobStatus, JobStore, StoredJob};
pub use clipping::{ClipPlan, Clipper, OverlapClassifier, VersioningWorkflow};
pub use config::{load_config, ClipConfig, OverlapThresholds};
pub use db::Database;
pub use error::{ClipError, ConfigError, GeometryError, NotifyError, Result, WorkerError};
pub use model::{Actor, BatchMeta, ClippedVersionResult};
pub use service::{ClipRequest, ClipService, ClipTarget, Submission};
