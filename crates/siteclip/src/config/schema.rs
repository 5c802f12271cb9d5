use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipConfig {
    pub version: String,
    /// Falls back to `~/.siteclip/data/siteclip.db` when unset.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Maximum number of polygons per sub-batch inside one run.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub thresholds: OverlapThresholds,
    /// Growth applied to the smaller polygon before subtraction, in degrees.
    #[serde(default = "default_buffer_epsilon")]
    pub buffer_epsilon: f64,
    #[serde(default = "default_job_ttl_hours")]
    pub job_ttl_hours: u64,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_worker_count() -> usize {
    10
}

fn default_batch_size() -> usize {
    20
}

fn default_buffer_epsilon() -> f64 {
    1e-6
}

fn default_job_ttl_hours() -> u64 {
    72
}

impl ClipConfig {
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }

    pub fn job_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.job_ttl_hours.min(i64::MAX as u64) as i64)
    }
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            thresholds: OverlapThresholds::default(),
            buffer_epsilon: default_buffer_epsilon(),
            job_ttl_hours: default_job_ttl_hours(),
            notifications: NotificationConfig::default(),
        }
    }
}

/// Upper bounds for an overlap to count as fixable. Both are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapThresholds {
    #[serde(default = "default_max_percentage")]
    pub max_percentage: f64,
    #[serde(default = "default_max_area_ha")]
    pub max_area_ha: f64,
}

fn default_max_percentage() -> f64 {
    3.5
}

fn default_max_area_ha() -> f64 {
    0.1
}

impl OverlapThresholds {
    pub fn admits(&self, percentage: f64, area_ha: f64) -> bool {
        percentage <= self.max_percentage && area_ha <= self.max_area_ha
    }
}

impl Default for OverlapThresholds {
    fn default() -> Self {
        Self {
            max_percentage: default_max_percentage(),
            max_area_ha: default_max_area_ha(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Completed jobs are POSTed here when set.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_are_inclusive() {
        let thresholds = OverlapThresholds::default();
        assert!(thresholds.admits(3.5, 0.1));
        assert!(thresholds.admits(2.5, 0.05));
        assert!(!thresholds.admits(4.0, 0.05));
        assert!(!thresholds.admits(2.5, 0.11));
        assert!(!thresholds.admits(f64::NAN, 0.05));
    }

    #[test]
    fn test_defaults() {
        let config = ClipConfig::default();
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.job_ttl(), chrono::Duration::hours(72));
        assert_eq!(config.notifications.timeout_secs, 10);
        assert!(config.database_path().is_some());
    }
}
