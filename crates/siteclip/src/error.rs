use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by submissions, jobs and the clipping workflow.
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Terminal job failure. The submission itself succeeded.
    #[error("Job failed ({status}): {message}")]
    JobFailure { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl ClipError {
    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ClipError::NotFound(_) => 404,
            ClipError::BadRequest(_) => 400,
            ClipError::Unauthorized(_) => 403,
            ClipError::JobFailure { status, .. } => *status,
            ClipError::Internal(_)
            | ClipError::Database(_)
            | ClipError::Geometry(_)
            | ClipError::Config(_)
            | ClipError::Worker(_) => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("WKT parse error: {0}")]
    WktParse(String),

    #[error("Unsupported geometry type '{0}', expected Polygon or MultiPolygon")]
    Unsupported(&'static str),

    #[error("Geometry is empty")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),
}

/// Completion notification failures. Never fatal to a job.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook responded with status {0}")]
    Status(u16),

    #[error("Invalid notifier configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClipError>;
