//! Builders for configurations and polygon layouts.

#![allow(dead_code)]

use std::path::Path;

use geo_types::{polygon, MultiPolygon};

use siteclip::config::{ClipConfig, NotificationConfig, OverlapThresholds};

/// Builder for `ClipConfig` instances.
pub struct ConfigBuilder {
    config: ClipConfig,
}

impl ConfigBuilder {
    /// Defaults suited to tests: two workers, default thresholds.
    pub fn new() -> Self {
        Self {
            config: ClipConfig {
                worker_count: 2,
                ..ClipConfig::default()
            },
        }
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn thresholds(mut self, max_percentage: f64, max_area_ha: f64) -> Self {
        self.config.thresholds = OverlapThresholds {
            max_percentage,
            max_area_ha,
        };
        self
    }

    pub fn database_path(mut self, path: &Path) -> Self {
        self.config.database_path = Some(path.to_path_buf());
        self
    }

    pub fn webhook(mut self, url: &str) -> Self {
        self.config.notifications = NotificationConfig {
            webhook_url: Some(url.to_string()),
            timeout_secs: 2,
        };
        self
    }

    pub fn build(self) -> ClipConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Axis-aligned rectangle in degrees.
pub fn rect(x: f64, y: f64, width: f64, height: f64) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![polygon![
        (x: x, y: y),
        (x: x + width, y: y),
        (x: x + width, y: y + height),
        (x: x, y: y + height),
        (x: x, y: y),
    ]])
}

/// Roughly 11 ha near the equator.
pub fn large_plot() -> MultiPolygon<f64> {
    rect(0.0, 0.0, 0.003, 0.003)
}

/// Roughly 6 ha, overlapping the east edge of `large_plot` by a 0.00001° strip.
pub fn small_plot() -> MultiPolygon<f64> {
    rect(0.00299, 0.0, 0.0025, 0.002)
}

/// A row of `count` plots where each overlaps the next by a thin strip.
/// Odd plots are taller, so every overlap clips an odd plot.
pub fn chained_row(count: usize) -> Vec<MultiPolygon<f64>> {
    (0..count)
        .map(|i| {
            let height = if i % 2 == 1 { 0.0025 } else { 0.002 };
            rect(i as f64 * 0.002, 0.0, 0.00201, height)
        })
        .collect()
}
